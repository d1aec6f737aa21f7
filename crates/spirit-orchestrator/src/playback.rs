//! Media playback side effect as a linear state machine over room-handle steps.
//!
//! `Idle -> LocatingControl -> ControlOpen -> Searching -> ResultsReady -> Playing`;
//! any failed step aborts the attempt and returns to `Idle`. Stopping passes through
//! `Stopped` and always lands back on `Idle`. There are no retries.

use std::time::Duration;

use spirit_browser::{HandleError, PlaybackStep, RoomHandle};
use thiserror::Error;
use tracing::debug;

use crate::PlaybackTimeouts;

/// Slack on top of the driver-side wait before the step is abandoned locally.
const STEP_GRACE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    LocatingControl,
    ControlOpen,
    Searching,
    ResultsReady,
    Playing,
    Stopped,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("playback step '{step}' failed: {source}")]
pub struct PlaybackError {
    pub step: &'static str,
    #[source]
    pub source: HandleError,
}

#[derive(Debug)]
pub struct PlaybackMachine {
    state: PlaybackState,
    timeouts: PlaybackTimeouts,
}

impl PlaybackMachine {
    pub fn new(timeouts: PlaybackTimeouts) -> Self {
        Self {
            state: PlaybackState::Idle,
            timeouts,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Runs one full attempt; a new command always starts again from `Idle`.
    pub async fn play(
        &mut self,
        handle: &mut dyn RoomHandle,
        query: &str,
    ) -> Result<(), PlaybackError> {
        self.state = PlaybackState::Idle;
        let plan = [
            (PlaybackStep::LocateControl, PlaybackState::LocatingControl),
            (PlaybackStep::OpenControl, PlaybackState::ControlOpen),
            (
                PlaybackStep::SubmitSearch {
                    query: query.to_string(),
                },
                PlaybackState::Searching,
            ),
            (PlaybackStep::AwaitResults, PlaybackState::ResultsReady),
            (PlaybackStep::PlayFirstResult, PlaybackState::Playing),
        ];
        for (step, reached) in plan {
            if let Err(source) = self.run_step(handle, &step).await {
                self.state = PlaybackState::Idle;
                return Err(PlaybackError {
                    step: step.name(),
                    source,
                });
            }
            self.state = reached;
        }
        Ok(())
    }

    pub async fn stop(&mut self, handle: &mut dyn RoomHandle) -> Result<(), PlaybackError> {
        self.state = PlaybackState::Stopped;
        let step = PlaybackStep::Stop;
        let outcome = self.run_step(handle, &step).await;
        self.state = PlaybackState::Idle;
        outcome.map_err(|source| PlaybackError {
            step: step.name(),
            source,
        })
    }

    async fn run_step(
        &self,
        handle: &mut dyn RoomHandle,
        step: &PlaybackStep,
    ) -> Result<(), HandleError> {
        let timeout = self.timeouts.for_step(step);
        debug!(step = step.name(), timeout_ms = timeout.as_millis() as u64, "playback step");
        let bounded = tokio::time::timeout(timeout + STEP_GRACE, handle.playback_step(step, timeout));
        match bounded.await {
            Ok(result) => result,
            Err(_) => Err(HandleError::Timeout {
                operation: step.name().to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}
