//! Per-session worker: polls the room handle on a fixed interval, filters and
//! deduplicates events, and handles each routed event strictly in arrival order.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use spirit_browser::{HandleError, RoomEvent, RoomHandle};
use spirit_core::current_unix_timestamp_ms;
use spirit_vault::{CredentialVault, DecryptedSecret, SealedSecret};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::registry::lock_or_recover;
use crate::reply_pipeline::{
    render_playback_started, render_playback_succeeded, HELP_TEXT, PLAYBACK_FAILED_ACK, STOP_ACK,
};
use crate::{
    ChatEvent, CommandDispatcher, DedupRecord, HistoryBuffer, HistoryEntry, OrchestratorConfig,
    PlaybackMachine, ReplyPipeline, Route, SessionExit, SessionRegistry,
};

#[derive(Debug, Default)]
pub(crate) struct IngestionCycleReport {
    pub discovered: usize,
    pub processed: usize,
    pub duplicates: usize,
    pub self_authored: usize,
    pub skipped_private: usize,
    pub failed: usize,
}

impl IngestionCycleReport {
    fn is_empty(&self) -> bool {
        self.discovered == 0
            && self.processed == 0
            && self.duplicates == 0
            && self.self_authored == 0
            && self.skipped_private == 0
            && self.failed == 0
    }
}

enum BatchOutcome {
    Continue,
    Cancelled,
    HandleClosed,
}

pub(crate) struct SessionWorker {
    pub tenant_id: String,
    pub room_key: String,
    pub sequence: u64,
    pub handle: Box<dyn RoomHandle>,
    pub history: Arc<Mutex<HistoryBuffer>>,
    pub sealed_secret: SealedSecret,
    pub vault: Arc<CredentialVault>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub pipeline: Arc<ReplyPipeline>,
    pub registry: Arc<SessionRegistry>,
    pub config: Arc<OrchestratorConfig>,
    pub dedup: DedupRecord,
    pub playback: PlaybackMachine,
}

/// Resolves once teardown is requested or the record owning the sender is gone.
pub(crate) async fn cancelled(cancel_rx: &mut watch::Receiver<bool>) {
    loop {
        if *cancel_rx.borrow() {
            return;
        }
        if cancel_rx.changed().await.is_err() {
            return;
        }
    }
}

impl SessionWorker {
    /// Runs until cancelled or the handle is lost. The handle is always closed on exit,
    /// and fatal exits remove this session's own registry record.
    pub(crate) async fn run(
        mut self,
        start_rx: oneshot::Receiver<()>,
        mut cancel_rx: watch::Receiver<bool>,
    ) -> SessionExit {
        let exit = match start_rx.await {
            Ok(()) => self.poll_until_exit(&mut cancel_rx).await,
            Err(_) => SessionExit::Cancelled,
        };

        if let Err(error) = self.handle.close().await {
            warn!(tenant_id = %self.tenant_id, error = %error, "room handle close failed");
        }
        if exit.is_fatal() {
            let removed = self
                .registry
                .remove_if_current(&self.tenant_id, self.sequence)
                .is_some();
            warn!(
                tenant_id = %self.tenant_id,
                room_key = %self.room_key,
                reason = ?exit,
                removed,
                "session torn down after fatal ingestion error"
            );
        } else {
            info!(tenant_id = %self.tenant_id, room_key = %self.room_key, "session worker stopped");
        }
        exit
    }

    async fn poll_until_exit(&mut self, cancel_rx: &mut watch::Receiver<bool>) -> SessionExit {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let poll_timeout = self.config.poll_timeout;
        let mut consecutive_failures = 0usize;

        loop {
            if *cancel_rx.borrow() {
                return SessionExit::Cancelled;
            }
            tokio::select! {
                _ = cancelled(cancel_rx) => return SessionExit::Cancelled,
                _ = interval.tick() => {}
            }

            let polled = tokio::select! {
                _ = cancelled(cancel_rx) => return SessionExit::Cancelled,
                polled = tokio::time::timeout(poll_timeout, self.handle.poll_events(poll_timeout)) => polled,
            };
            let failure = match polled {
                Ok(Ok(events)) => {
                    consecutive_failures = 0;
                    let mut report = IngestionCycleReport {
                        discovered: events.len(),
                        ..IngestionCycleReport::default()
                    };
                    let outcome = self.process_batch(events, cancel_rx, &mut report).await;
                    if !report.is_empty() {
                        debug!(
                            tenant_id = %self.tenant_id,
                            discovered = report.discovered,
                            processed = report.processed,
                            duplicates = report.duplicates,
                            self_authored = report.self_authored,
                            skipped_private = report.skipped_private,
                            failed = report.failed,
                            "ingestion cycle"
                        );
                    }
                    match outcome {
                        BatchOutcome::Continue => continue,
                        BatchOutcome::Cancelled => return SessionExit::Cancelled,
                        BatchOutcome::HandleClosed => return SessionExit::HandleClosed,
                    }
                }
                Ok(Err(HandleError::Closed)) => return SessionExit::HandleClosed,
                Ok(Err(error)) => error,
                Err(_) => HandleError::Timeout {
                    operation: "poll".to_string(),
                    timeout_ms: poll_timeout.as_millis() as u64,
                },
            };
            if self.handle.is_closed() {
                warn!(tenant_id = %self.tenant_id, error = %failure, "room handle closed during poll");
                return SessionExit::HandleClosed;
            }

            consecutive_failures = consecutive_failures.saturating_add(1);
            warn!(
                tenant_id = %self.tenant_id,
                consecutive_failures,
                error = %failure,
                "room poll failed"
            );
            if consecutive_failures >= self.config.max_consecutive_poll_failures {
                return SessionExit::TransientExhausted {
                    failures: consecutive_failures,
                };
            }
        }
    }

    async fn process_batch(
        &mut self,
        events: Vec<RoomEvent>,
        cancel_rx: &mut watch::Receiver<bool>,
        report: &mut IngestionCycleReport,
    ) -> BatchOutcome {
        for raw in events {
            if *cancel_rx.borrow() {
                return BatchOutcome::Cancelled;
            }
            let event = ChatEvent::observed(raw, current_unix_timestamp_ms());
            if self.config.is_self_authored(&event.author)
                || self.config.is_ignored_author(&event.author)
            {
                report.self_authored += 1;
                continue;
            }
            if self.dedup.is_duplicate(&event.author, &event.text) {
                report.duplicates += 1;
                continue;
            }
            self.dedup.remember(&event.author, &event.text);

            let route = self.dispatcher.classify(&event);
            if route == Route::SkipPrivate {
                report.skipped_private += 1;
                continue;
            }
            lock_or_recover(&self.history).push(HistoryEntry::inbound(event.clone()));
            report.processed += 1;

            let handled = tokio::select! {
                _ = cancelled(cancel_rx) => return BatchOutcome::Cancelled,
                handled = self.handle_route(route, &event) => handled,
            };
            match handled {
                Ok(()) => {}
                Err(HandleError::Closed) => return BatchOutcome::HandleClosed,
                Err(error) if self.handle.is_closed() => {
                    warn!(tenant_id = %self.tenant_id, error = %error, "room handle closed while handling event");
                    return BatchOutcome::HandleClosed;
                }
                Err(error) => {
                    report.failed += 1;
                    warn!(tenant_id = %self.tenant_id, error = %error, "event handling failed");
                }
            }
        }
        BatchOutcome::Continue
    }

    async fn handle_route(&mut self, route: Route, event: &ChatEvent) -> Result<(), HandleError> {
        match route {
            Route::Ignore | Route::SkipPrivate => Ok(()),
            Route::Converse => {
                let Some(credential) = self.open_credential() else {
                    return Ok(());
                };
                let context =
                    lock_or_recover(&self.history).context_before_latest(self.config.context_window);
                let Some(reply) = self
                    .pipeline
                    .conversational_reply(&credential, event, context)
                    .await
                else {
                    return Ok(());
                };
                self.send(&reply).await?;
                let agent = self.config.agent_name().to_string();
                lock_or_recover(&self.history).push(HistoryEntry::outbound(ChatEvent::outbound(
                    &agent,
                    &reply,
                    current_unix_timestamp_ms(),
                )));
                Ok(())
            }
            Route::Play { query } => {
                info!(tenant_id = %self.tenant_id, query = %query, "playback requested");
                self.send(&render_playback_started(&query)).await?;
                match self.playback.play(self.handle.as_mut(), &query).await {
                    Ok(()) => self.send(&render_playback_succeeded(&query)).await,
                    Err(error) if error.source.is_closed() => Err(HandleError::Closed),
                    Err(error) => {
                        warn!(tenant_id = %self.tenant_id, error = %error, "playback failed");
                        self.send(PLAYBACK_FAILED_ACK).await
                    }
                }
            }
            Route::Stop => {
                self.send(STOP_ACK).await?;
                match self.playback.stop(self.handle.as_mut()).await {
                    Ok(()) => Ok(()),
                    Err(error) if error.source.is_closed() => Err(HandleError::Closed),
                    Err(error) => {
                        warn!(tenant_id = %self.tenant_id, error = %error, "stop playback failed");
                        Ok(())
                    }
                }
            }
            Route::Help => self.send(HELP_TEXT).await,
            Route::Suggest { seed } => {
                let Some(credential) = self.open_credential() else {
                    return Ok(());
                };
                let rendered = self.pipeline.suggestions(&credential, &seed).await;
                self.send(&rendered).await
            }
        }
    }

    fn open_credential(&self) -> Option<DecryptedSecret> {
        match self.vault.open(&self.sealed_secret) {
            Ok(credential) => Some(credential),
            Err(error) => {
                warn!(tenant_id = %self.tenant_id, error = %error, "tenant credential could not be opened");
                None
            }
        }
    }

    /// Sends one line, then holds the pipeline for the anti-flood delay.
    async fn send(&mut self, text: &str) -> Result<(), HandleError> {
        let send_timeout = self.config.send_timeout;
        match tokio::time::timeout(send_timeout, self.handle.send_text(text, send_timeout)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(HandleError::Timeout {
                    operation: "send".to_string(),
                    timeout_ms: send_timeout.as_millis() as u64,
                })
            }
        }
        if self.config.post_send_delay > Duration::ZERO {
            tokio::time::sleep(self.config.post_send_delay).await;
        }
        Ok(())
    }
}
