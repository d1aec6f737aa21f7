//! Room automation seam: the traits the orchestrator drives, the NDJSON sidecar
//! driver used in production, a scripted in-memory driver, and the persisted
//! session template store.
mod room_automation;
mod scripted;
mod sidecar;
mod template_store;

pub use room_automation::{
    HandleError, PlaybackStep, RoomAutomation, RoomEvent, RoomHandle, RoomTarget, SessionTemplate,
};
pub use scripted::ScriptedRoomAutomation;
pub use sidecar::{SidecarConfig, SidecarRoomAutomation};
pub use template_store::SessionTemplateStore;
