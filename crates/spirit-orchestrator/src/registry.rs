//! Authoritative tenant -> session map. At most one record per tenant.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use spirit_browser::RoomTarget;
use spirit_vault::SealedSecret;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{HistoryBuffer, SessionExit};

/// Ownership token for a running session worker.
#[derive(Debug)]
pub struct PollHandle {
    pub(crate) cancel_tx: watch::Sender<bool>,
    pub(crate) join: JoinHandle<SessionExit>,
}

#[derive(Debug)]
pub struct SessionRecord {
    pub tenant_id: String,
    pub room: RoomTarget,
    pub created_unix_ms: u64,
    /// Distinguishes successive sessions of the same tenant.
    pub sequence: u64,
    pub sealed_secret: SealedSecret,
    pub history: Arc<Mutex<HistoryBuffer>>,
    pub(crate) poll: Option<PollHandle>,
}

impl SessionRecord {
    pub fn history_len(&self) -> usize {
        lock_or_recover(&self.history).len()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            tenant_id: self.tenant_id.clone(),
            room_key: self.room.room_key.clone(),
            created_unix_ms: self.created_unix_ms,
            history_len: self.history_len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// Read-only view of one session; carries no secrets.
pub struct SessionSummary {
    pub tenant_id: String,
    pub room_key: String,
    pub created_unix_ms: u64,
    pub history_len: usize,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionRecord>>,
    next_sequence: AtomicU64,
}

pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Inserts `record`, handing back whatever it displaced.
    pub fn insert(&self, record: SessionRecord) -> Option<SessionRecord> {
        lock_or_recover(&self.sessions).insert(record.tenant_id.clone(), record)
    }

    pub fn remove(&self, tenant_id: &str) -> Option<SessionRecord> {
        lock_or_recover(&self.sessions).remove(tenant_id)
    }

    /// Removes the tenant's record only if it is still the session numbered `sequence`.
    pub fn remove_if_current(&self, tenant_id: &str, sequence: u64) -> Option<SessionRecord> {
        let mut sessions = lock_or_recover(&self.sessions);
        if sessions
            .get(tenant_id)
            .is_some_and(|record| record.sequence == sequence)
        {
            return sessions.remove(tenant_id);
        }
        None
    }

    pub fn drain(&self) -> Vec<SessionRecord> {
        lock_or_recover(&self.sessions)
            .drain()
            .map(|(_, record)| record)
            .collect()
    }

    pub fn contains(&self, tenant_id: &str) -> bool {
        lock_or_recover(&self.sessions).contains_key(tenant_id)
    }

    pub fn room_key_for(&self, tenant_id: &str) -> Option<String> {
        lock_or_recover(&self.sessions)
            .get(tenant_id)
            .map(|record| record.room.room_key.clone())
    }

    /// Snapshot ordered by creation time.
    pub fn summaries(&self) -> Vec<SessionSummary> {
        let mut summaries = lock_or_recover(&self.sessions)
            .values()
            .map(SessionRecord::summary)
            .collect::<Vec<_>>();
        summaries.sort_by(|left, right| {
            left.created_unix_ms
                .cmp(&right.created_unix_ms)
                .then_with(|| left.tenant_id.cmp(&right.tenant_id))
        });
        summaries
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
