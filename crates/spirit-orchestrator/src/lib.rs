//! Multi-session agent orchestrator.
//!
//! One worker task per tenant session polls its room handle, deduplicates and buffers
//! chat events, routes each event to a conversational reply, a scripted command, or
//! the playback side effect, and sends replies one at a time. The
//! [`SessionSupervisor`] owns the registry and every session's lifecycle.

mod config;
mod dispatcher;
mod error;
mod history;
mod ingestion;
mod playback;
mod registry;
mod reply_pipeline;
mod room_link;
mod supervisor;

pub use config::{OrchestratorConfig, PlaybackTimeouts, DEFAULT_GREETING, DEFAULT_ROOM_BASE_URL};
pub use dispatcher::{CommandDispatcher, Route};
pub use error::{
    ActivationAck, ActivationError, DeactivationAck, NotFoundError, SessionExit, ValidationError,
};
pub use history::{ChatEvent, DedupRecord, HistoryBuffer, HistoryEntry, HistoryOrigin};
pub use playback::{PlaybackError, PlaybackMachine, PlaybackState};
pub use registry::{PollHandle, SessionRecord, SessionRegistry, SessionSummary};
pub use reply_pipeline::{
    apply_length_policy, is_advice_request, render_playback_started, render_playback_succeeded,
    render_suggestions, ReplyPipeline, HELP_TEXT, NO_SUGGESTIONS_ACK, PLAYBACK_FAILED_ACK,
    STOP_ACK,
};
pub use room_link::parse_room_link;
pub use supervisor::{ActivationRequest, SessionSupervisor, ShutdownReport};
