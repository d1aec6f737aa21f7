use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One chat line observed by a handle, as reported by the automation driver.
pub struct RoomEvent {
    pub author: String,
    pub text: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub has_quote: bool,
}

impl RoomEvent {
    pub fn public(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
            is_private: false,
            has_quote: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomTarget {
    pub room_key: String,
    pub access_key: Option<String>,
    pub url: String,
}

/// Opaque authenticated browser state every handle is cloned from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionTemplate(serde_json::Value);

impl SessionTemplate {
    pub fn new(state: serde_json::Value) -> Self {
        Self(state)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
/// One UI interaction of the playback side effect.
pub enum PlaybackStep {
    LocateControl,
    OpenControl,
    SubmitSearch { query: String },
    AwaitResults,
    PlayFirstResult,
    Stop,
}

impl PlaybackStep {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LocateControl => "locate_control",
            Self::OpenControl => "open_control",
            Self::SubmitSearch { .. } => "submit_search",
            Self::AwaitResults => "await_results",
            Self::PlayFirstResult => "play_first_result",
            Self::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandleError {
    /// The handle is gone; nothing further can be done with it.
    #[error("room handle is closed")]
    Closed,
    #[error("room handle operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
    #[error("room handle operation failed: {0}")]
    Failed(String),
}

impl HandleError {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

#[async_trait]
/// Factory for isolated room handles.
pub trait RoomAutomation: Send + Sync {
    /// Opens a fresh handle whose browser state is cloned from `template`.
    async fn open_session(
        &self,
        template: &SessionTemplate,
    ) -> Result<Box<dyn RoomHandle>, HandleError>;

    /// Runs the interactive sign-in flow and returns the resulting state.
    async fn capture_template(&self) -> Result<SessionTemplate, HandleError>;
}

#[async_trait]
/// A live, exclusively owned connection to one room.
pub trait RoomHandle: Send {
    /// Navigates to the room and dismisses any welcome screen.
    async fn join_room(&mut self, target: &RoomTarget, timeout: Duration)
        -> Result<(), HandleError>;

    /// Returns events observed since the previous poll, in arrival order.
    async fn poll_events(&mut self, timeout: Duration) -> Result<Vec<RoomEvent>, HandleError>;

    async fn send_text(&mut self, text: &str, timeout: Duration) -> Result<(), HandleError>;

    async fn playback_step(
        &mut self,
        step: &PlaybackStep,
        timeout: Duration,
    ) -> Result<(), HandleError>;

    /// Releases the handle. Calling it again is a no-op.
    async fn close(&mut self) -> Result<(), HandleError>;

    fn is_closed(&self) -> bool;
}

pub(crate) fn duration_ms(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{PlaybackStep, RoomEvent};

    #[test]
    fn playback_steps_serialize_with_kind_tag() {
        let step = PlaybackStep::SubmitSearch {
            query: "waterfalls".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&step).expect("serialize"),
            json!({ "kind": "submit_search", "query": "waterfalls" })
        );
        assert_eq!(step.name(), "submit_search");
        assert_eq!(
            serde_json::to_value(PlaybackStep::Stop).expect("serialize"),
            json!({ "kind": "stop" })
        );
    }

    #[test]
    fn room_event_flags_default_to_false() {
        let event: RoomEvent =
            serde_json::from_value(json!({ "author": "Mia", "text": "hello" })).expect("parse");
        assert_eq!(event, RoomEvent::public("Mia", "hello"));
    }
}
