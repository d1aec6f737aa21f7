//! In-memory driver with scripted rooms, used by runtime and integration tests and
//! for running the gateway without a browser.
//!
//! Rooms are keyed by room key: events pushed for a room are delivered to whichever
//! handle joined it, and everything that handle sends is recorded there.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::room_automation::{
    duration_ms, HandleError, PlaybackStep, RoomAutomation, RoomEvent, RoomHandle, RoomTarget,
    SessionTemplate,
};

#[derive(Debug, Default)]
struct ScriptedRoom {
    pending: VecDeque<RoomEvent>,
    sent: Vec<String>,
    playback_steps: Vec<PlaybackStep>,
    failing_step: Option<&'static str>,
    poll_failures_remaining: usize,
    crash_next_poll: bool,
    closed_remotely: bool,
    joins: usize,
}

#[derive(Debug, Default)]
struct ScriptedWorld {
    rooms: HashMap<String, ScriptedRoom>,
    handles_opened: usize,
    handles_closed: usize,
    fail_next_open: Option<String>,
    fail_joins: bool,
    captured_template: Option<SessionTemplate>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedRoomAutomation {
    world: Arc<Mutex<ScriptedWorld>>,
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ScriptedRoomAutomation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_captured_template(self, template: SessionTemplate) -> Self {
        lock_or_recover(&self.world).captured_template = Some(template);
        self
    }

    pub fn push_event(&self, room_key: &str, event: RoomEvent) {
        let mut world = lock_or_recover(&self.world);
        world
            .rooms
            .entry(room_key.to_string())
            .or_default()
            .pending
            .push_back(event);
    }

    pub fn sent_texts(&self, room_key: &str) -> Vec<String> {
        let world = lock_or_recover(&self.world);
        world
            .rooms
            .get(room_key)
            .map(|room| room.sent.clone())
            .unwrap_or_default()
    }

    pub fn playback_steps(&self, room_key: &str) -> Vec<PlaybackStep> {
        let world = lock_or_recover(&self.world);
        world
            .rooms
            .get(room_key)
            .map(|room| room.playback_steps.clone())
            .unwrap_or_default()
    }

    pub fn joins(&self, room_key: &str) -> usize {
        let world = lock_or_recover(&self.world);
        world.rooms.get(room_key).map_or(0, |room| room.joins)
    }

    /// Makes the named playback step time out for this room until cleared.
    pub fn fail_playback_step(&self, room_key: &str, step_name: &'static str) {
        let mut world = lock_or_recover(&self.world);
        world
            .rooms
            .entry(room_key.to_string())
            .or_default()
            .failing_step = Some(step_name);
    }

    pub fn fail_polls(&self, room_key: &str, count: usize) {
        let mut world = lock_or_recover(&self.world);
        world
            .rooms
            .entry(room_key.to_string())
            .or_default()
            .poll_failures_remaining = count;
    }

    /// Makes the next poll fail with a generic error while the handle reports itself
    /// closed, as a driver does when its process exits mid-request.
    pub fn crash_next_poll(&self, room_key: &str) {
        let mut world = lock_or_recover(&self.world);
        world
            .rooms
            .entry(room_key.to_string())
            .or_default()
            .crash_next_poll = true;
    }

    /// Simulates the remote page dying under the handle.
    pub fn close_remotely(&self, room_key: &str) {
        let mut world = lock_or_recover(&self.world);
        world
            .rooms
            .entry(room_key.to_string())
            .or_default()
            .closed_remotely = true;
    }

    pub fn fail_next_open(&self, message: impl Into<String>) {
        lock_or_recover(&self.world).fail_next_open = Some(message.into());
    }

    pub fn fail_joins(&self, fail: bool) {
        lock_or_recover(&self.world).fail_joins = fail;
    }

    pub fn handles_opened(&self) -> usize {
        lock_or_recover(&self.world).handles_opened
    }

    pub fn handles_closed(&self) -> usize {
        lock_or_recover(&self.world).handles_closed
    }

    pub fn open_handles(&self) -> usize {
        let world = lock_or_recover(&self.world);
        world.handles_opened.saturating_sub(world.handles_closed)
    }
}

#[async_trait]
impl RoomAutomation for ScriptedRoomAutomation {
    async fn open_session(
        &self,
        _template: &SessionTemplate,
    ) -> Result<Box<dyn RoomHandle>, HandleError> {
        let mut world = lock_or_recover(&self.world);
        if let Some(message) = world.fail_next_open.take() {
            return Err(HandleError::Failed(message));
        }
        world.handles_opened += 1;
        Ok(Box::new(ScriptedHandle {
            world: self.world.clone(),
            room_key: None,
            closed: false,
        }))
    }

    async fn capture_template(&self) -> Result<SessionTemplate, HandleError> {
        lock_or_recover(&self.world)
            .captured_template
            .clone()
            .ok_or_else(|| HandleError::Failed("no scripted template configured".to_string()))
    }
}

struct ScriptedHandle {
    world: Arc<Mutex<ScriptedWorld>>,
    room_key: Option<String>,
    closed: bool,
}

impl ScriptedHandle {
    fn with_room<T>(
        &mut self,
        apply: impl FnOnce(&mut ScriptedRoom) -> Result<T, HandleError>,
    ) -> Result<T, HandleError> {
        if self.closed {
            return Err(HandleError::Closed);
        }
        let Some(room_key) = self.room_key.clone() else {
            return Err(HandleError::Failed("handle has not joined a room".to_string()));
        };
        let mut world = lock_or_recover(&self.world);
        let room = world.rooms.entry(room_key).or_default();
        if room.closed_remotely {
            drop(world);
            self.closed = true;
            self.release();
            return Err(HandleError::Closed);
        }
        apply(room)
    }

    fn release(&self) {
        lock_or_recover(&self.world).handles_closed += 1;
    }
}

#[async_trait]
impl RoomHandle for ScriptedHandle {
    async fn join_room(
        &mut self,
        target: &RoomTarget,
        timeout: Duration,
    ) -> Result<(), HandleError> {
        if self.closed {
            return Err(HandleError::Closed);
        }
        let mut world = lock_or_recover(&self.world);
        if world.fail_joins {
            return Err(HandleError::Timeout {
                operation: "join".to_string(),
                timeout_ms: duration_ms(timeout),
            });
        }
        let room = world.rooms.entry(target.room_key.clone()).or_default();
        room.joins += 1;
        room.closed_remotely = false;
        drop(world);
        self.room_key = Some(target.room_key.clone());
        Ok(())
    }

    async fn poll_events(&mut self, _timeout: Duration) -> Result<Vec<RoomEvent>, HandleError> {
        let crashed = self.with_room(|room| Ok(std::mem::take(&mut room.crash_next_poll)))?;
        if crashed {
            self.closed = true;
            self.release();
            return Err(HandleError::Failed("room driver exited mid-request".to_string()));
        }
        self.with_room(|room| {
            if room.poll_failures_remaining > 0 {
                room.poll_failures_remaining -= 1;
                return Err(HandleError::Failed("scripted poll failure".to_string()));
            }
            Ok(room.pending.drain(..).collect())
        })
    }

    async fn send_text(&mut self, text: &str, _timeout: Duration) -> Result<(), HandleError> {
        self.with_room(|room| {
            room.sent.push(text.to_string());
            Ok(())
        })
    }

    async fn playback_step(
        &mut self,
        step: &PlaybackStep,
        timeout: Duration,
    ) -> Result<(), HandleError> {
        self.with_room(|room| {
            room.playback_steps.push(step.clone());
            if room.failing_step == Some(step.name()) {
                return Err(HandleError::Timeout {
                    operation: step.name().to_string(),
                    timeout_ms: duration_ms(timeout),
                });
            }
            Ok(())
        })
    }

    async fn close(&mut self) -> Result<(), HandleError> {
        if !self.closed {
            self.closed = true;
            self.release();
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
