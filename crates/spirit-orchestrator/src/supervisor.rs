//! Lifecycle supervisor: activation, deactivation, and shutdown of tenant sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::future::join_all;
use spirit_ai::CompanionService;
use spirit_browser::{HandleError, RoomAutomation, RoomHandle, RoomTarget, SessionTemplate};
use spirit_core::current_unix_timestamp_ms;
use spirit_vault::CredentialVault;
use tokio::sync::{oneshot, watch};
use tracing::{info, warn};

use crate::ingestion::SessionWorker;
use crate::registry::{lock_or_recover, PollHandle};
use crate::{
    parse_room_link, ActivationAck, ActivationError, CommandDispatcher, DeactivationAck,
    DedupRecord, HistoryBuffer, NotFoundError, OrchestratorConfig, PlaybackMachine, ReplyPipeline,
    SessionRecord, SessionRegistry, SessionSummary, ValidationError,
};


type TenantLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationRequest {
    pub tenant_id: String,
    pub room_link: String,
    pub credential: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub stopped: usize,
    pub forced: usize,
}

pub struct SessionSupervisor {
    config: Arc<OrchestratorConfig>,
    registry: Arc<SessionRegistry>,
    vault: Arc<CredentialVault>,
    automation: Arc<dyn RoomAutomation>,
    template: SessionTemplate,
    dispatcher: Arc<CommandDispatcher>,
    pipeline: Arc<ReplyPipeline>,
    tenant_locks: TenantLocks,
}

impl SessionSupervisor {
    pub fn new(
        config: OrchestratorConfig,
        vault: Arc<CredentialVault>,
        automation: Arc<dyn RoomAutomation>,
        template: SessionTemplate,
        companion: Arc<dyn CompanionService>,
    ) -> Self {
        let dispatcher = Arc::new(CommandDispatcher::new(&config));
        let pipeline = Arc::new(ReplyPipeline::new(companion, config.casual_reply_budget));
        Self {
            config: Arc::new(config),
            registry: Arc::new(SessionRegistry::new()),
            vault,
            automation,
            template,
            dispatcher,
            pipeline,
            tenant_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn list(&self) -> Vec<SessionSummary> {
        self.registry.summaries()
    }

    pub fn active_count(&self) -> usize {
        self.registry.len()
    }

    /// Validates the request without touching any session.
    pub fn validate(&self, request: &ActivationRequest) -> Result<RoomTarget, ValidationError> {
        let tenant_id = request.tenant_id.trim();
        if tenant_id.is_empty() {
            return Err(ValidationError::MissingField("tenantId"));
        }
        if request.room_link.trim().is_empty() {
            return Err(ValidationError::MissingField("roomLink"));
        }
        if request.credential.trim().is_empty() {
            return Err(ValidationError::MissingField("credential"));
        }
        if tenant_id.chars().count() < self.config.min_tenant_id_chars {
            return Err(ValidationError::InvalidTenant);
        }
        parse_room_link(&request.room_link, &self.config.room_base_url)
    }

    pub async fn activate(
        &self,
        request: ActivationRequest,
    ) -> Result<ActivationAck, ActivationError> {
        let target = self.validate(&request)?;
        let tenant_id = request.tenant_id.trim().to_string();
        let lease = self.lease_tenant(&tenant_id);
        let _guard = lease.lock.lock().await;
        self.activate_locked(&tenant_id, &request.credential, target).await
    }

    pub async fn deactivate(&self, tenant_id: &str) -> Result<DeactivationAck, NotFoundError> {
        let tenant_id = tenant_id.trim();
        if !self.registry.contains(tenant_id) {
            return Err(NotFoundError {
                tenant_id: tenant_id.to_string(),
            });
        }
        let lease = self.lease_tenant(tenant_id);
        let _guard = lease.lock.lock().await;
        self.deactivate_locked(tenant_id).await
    }

    async fn activate_locked(
        &self,
        tenant_id: &str,
        credential: &str,
        target: RoomTarget,
    ) -> Result<ActivationAck, ActivationError> {
        let tenant_id = tenant_id.to_string();
        if self.registry.room_key_for(&tenant_id).as_deref() == Some(target.room_key.as_str()) {
            info!(tenant_id = %tenant_id, room_key = %target.room_key, "session already active");
            return Ok(ActivationAck::AlreadyActive {
                room_key: target.room_key,
            });
        }
        if let Some(previous) = self.registry.remove(&tenant_id) {
            info!(
                tenant_id = %tenant_id,
                previous_room = %previous.room.room_key,
                room_key = %target.room_key,
                "replacing session in another room"
            );
            self.teardown(previous).await;
        }

        let sealed_secret = self.vault.seal(credential.trim())?;
        let handle = self.open_joined_handle(&tenant_id, &target).await?;

        let sequence = self.registry.next_sequence();
        let history = Arc::new(Mutex::new(HistoryBuffer::new(self.config.history_capacity)));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (start_tx, start_rx) = oneshot::channel();
        let worker = SessionWorker {
            tenant_id: tenant_id.clone(),
            room_key: target.room_key.clone(),
            sequence,
            handle,
            history: history.clone(),
            sealed_secret: sealed_secret.clone(),
            vault: self.vault.clone(),
            dispatcher: self.dispatcher.clone(),
            pipeline: self.pipeline.clone(),
            registry: self.registry.clone(),
            config: self.config.clone(),
            dedup: DedupRecord::new(self.config.dedup_window),
            playback: PlaybackMachine::new(self.config.playback_timeouts.clone()),
        };
        let join = tokio::spawn(worker.run(start_rx, cancel_rx));

        let room_key = target.room_key.clone();
        self.registry.insert(SessionRecord {
            tenant_id: tenant_id.clone(),
            room: target,
            created_unix_ms: current_unix_timestamp_ms(),
            sequence,
            sealed_secret,
            history,
            poll: Some(PollHandle { cancel_tx, join }),
        });
        let _ = start_tx.send(());
        info!(tenant_id = %tenant_id, room_key = %room_key, "session activated");
        Ok(ActivationAck::Activated { room_key })
    }

    async fn deactivate_locked(&self, tenant_id: &str) -> Result<DeactivationAck, NotFoundError> {
        let record = self.registry.remove(tenant_id).ok_or_else(|| NotFoundError {
            tenant_id: tenant_id.to_string(),
        })?;
        let ack = DeactivationAck {
            tenant_id: record.tenant_id.clone(),
            room_key: record.room.room_key.clone(),
        };
        self.teardown(record).await;
        info!(tenant_id = %ack.tenant_id, room_key = %ack.room_key, "session deactivated");
        Ok(ack)
    }

    /// Tears down every session, bounded by the configured shutdown timeout.
    pub async fn shutdown_all(&self) -> ShutdownReport {
        let records = self.registry.drain();
        if records.is_empty() {
            return ShutdownReport::default();
        }
        info!(sessions = records.len(), "shutting down all sessions");
        let total = records.len();
        let teardowns = join_all(records.into_iter().map(|record| self.teardown(record)));
        match tokio::time::timeout(self.config.shutdown_timeout, teardowns).await {
            Ok(outcomes) => {
                let forced = outcomes.into_iter().filter(|clean| !clean).count();
                ShutdownReport {
                    stopped: total - forced,
                    forced,
                }
            }
            Err(_) => {
                warn!(sessions = total, "shutdown timed out before every session stopped");
                ShutdownReport {
                    stopped: 0,
                    forced: total,
                }
            }
        }
    }

    async fn open_joined_handle(
        &self,
        tenant_id: &str,
        target: &RoomTarget,
    ) -> Result<Box<dyn RoomHandle>, ActivationError> {
        let mut handle = self.automation.open_session(&self.template).await?;
        let join_timeout = self.config.join_timeout;
        let bounded = tokio::time::timeout(join_timeout, handle.join_room(target, join_timeout));
        let joined = match bounded.await {
            Ok(result) => result,
            Err(_) => Err(HandleError::Timeout {
                operation: "join".to_string(),
                timeout_ms: join_timeout.as_millis() as u64,
            }),
        };
        if let Err(error) = joined {
            warn!(tenant_id = %tenant_id, room_key = %target.room_key, error = %error, "room join failed");
            let _ = handle.close().await;
            return Err(ActivationError::HandleOpen(error));
        }

        if let Some(greeting) = self.config.greeting.as_deref() {
            let send_timeout = self.config.send_timeout;
            let greeted =
                tokio::time::timeout(send_timeout, handle.send_text(greeting, send_timeout));
            match greeted.await {
                Ok(Ok(())) => {}
                Ok(Err(HandleError::Closed)) => {
                    let _ = handle.close().await;
                    return Err(ActivationError::HandleOpen(HandleError::Closed));
                }
                Ok(Err(error)) => {
                    warn!(tenant_id = %tenant_id, error = %error, "greeting could not be sent");
                }
                Err(_) => {
                    warn!(tenant_id = %tenant_id, "greeting timed out");
                }
            }
        }
        Ok(handle)
    }

    /// Stops the worker and waits for it to release its handle. Returns `false` when
    /// the worker had to be aborted.
    async fn teardown(&self, mut record: SessionRecord) -> bool {
        let Some(poll) = record.poll.take() else {
            return true;
        };
        let PollHandle { cancel_tx, mut join } = poll;
        let _ = cancel_tx.send(true);
        match tokio::time::timeout(self.config.teardown_timeout, &mut join).await {
            Ok(_) => true,
            Err(_) => {
                warn!(tenant_id = %record.tenant_id, "session worker did not stop in time; aborting");
                join.abort();
                false
            }
        }
    }

    fn lease_tenant(&self, tenant_id: &str) -> TenantLease<'_> {
        let lock = lock_or_recover(&self.tenant_locks)
            .entry(tenant_id.to_string())
            .or_default()
            .clone();
        TenantLease {
            locks: &self.tenant_locks,
            tenant_id: tenant_id.to_string(),
            lock,
        }
    }

    #[cfg(test)]
    fn tenant_lock_count(&self) -> usize {
        lock_or_recover(&self.tenant_locks).len()
    }
}

/// Serializes operations for one tenant. The map entry lives only while some operation
/// holds a lease, including callers dropped while still waiting.
struct TenantLease<'a> {
    locks: &'a TenantLocks,
    tenant_id: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for TenantLease<'_> {
    fn drop(&mut self) {
        let mut locks = lock_or_recover(self.locks);
        // Leases clone under the map lock: map plus this lease means no other holder.
        let idle = locks.get(&self.tenant_id).is_some_and(|entry| {
            Arc::ptr_eq(entry, &self.lock) && Arc::strong_count(&self.lock) == 2
        });
        if idle {
            locks.remove(&self.tenant_id);
        }
    }
}
