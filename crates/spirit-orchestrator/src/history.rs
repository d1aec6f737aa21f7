//! Per-session bounded chat log and the fingerprint record used to drop repeats.

use std::collections::VecDeque;

use serde::Serialize;
use sha2::{Digest, Sha256};
use spirit_ai::ConversationLine;
use spirit_browser::RoomEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub author: String,
    pub text: String,
    pub observed_unix_ms: u64,
    pub is_private: bool,
    pub has_quote: bool,
}

impl ChatEvent {
    pub fn observed(event: RoomEvent, observed_unix_ms: u64) -> Self {
        Self {
            author: event.author.trim().to_string(),
            text: event.text.trim().to_string(),
            observed_unix_ms,
            is_private: event.is_private,
            has_quote: event.has_quote,
        }
    }

    pub fn outbound(author: &str, text: &str, observed_unix_ms: u64) -> Self {
        Self {
            author: author.to_string(),
            text: text.to_string(),
            observed_unix_ms,
            is_private: false,
            has_quote: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOrigin {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub event: ChatEvent,
    pub origin: HistoryOrigin,
}

impl HistoryEntry {
    pub fn inbound(event: ChatEvent) -> Self {
        Self {
            event,
            origin: HistoryOrigin::Inbound,
        }
    }

    pub fn outbound(event: ChatEvent) -> Self {
        Self {
            event,
            origin: HistoryOrigin::Outbound,
        }
    }

    fn to_line(&self) -> ConversationLine {
        ConversationLine::new(self.event.author.clone(), self.event.text.clone())
    }
}

#[derive(Debug, Clone)]
/// FIFO log; pushing past capacity drops the oldest entry.
pub struct HistoryBuffer {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Up to `limit` most recent entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Up to `limit` entries preceding the newest one, oldest first, as prompt lines.
    pub fn context_before_latest(&self, limit: usize) -> Vec<ConversationLine> {
        let end = self.entries.len().saturating_sub(1);
        let start = end.saturating_sub(limit);
        self.entries
            .range(start..end)
            .map(HistoryEntry::to_line)
            .collect()
    }
}

#[derive(Debug, Clone)]
/// Fingerprints of the most recent inbound `(author, text)` pairs.
pub struct DedupRecord {
    window: usize,
    fingerprints: VecDeque<[u8; 32]>,
}

impl DedupRecord {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            fingerprints: VecDeque::new(),
        }
    }

    pub fn is_duplicate(&self, author: &str, text: &str) -> bool {
        let fingerprint = event_fingerprint(author, text);
        self.fingerprints.contains(&fingerprint)
    }

    pub fn remember(&mut self, author: &str, text: &str) {
        while self.fingerprints.len() >= self.window {
            self.fingerprints.pop_front();
        }
        self.fingerprints.push_back(event_fingerprint(author, text));
    }
}

fn event_fingerprint(author: &str, text: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(author.as_bytes());
    hasher.update([0x1f]);
    hasher.update(text.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::{ChatEvent, DedupRecord, HistoryBuffer, HistoryEntry, HistoryOrigin};

    fn inbound(author: &str, text: &str) -> HistoryEntry {
        HistoryEntry::inbound(ChatEvent::outbound(author, text, 0))
    }

    #[test]
    fn buffer_never_exceeds_capacity_and_keeps_arrival_order() {
        let mut history = HistoryBuffer::new(100);
        for index in 0..101 {
            history.push(inbound("Mia", &format!("message {index}")));
        }
        assert_eq!(history.len(), 100);
        let texts = history
            .entries()
            .map(|entry| entry.event.text.clone())
            .collect::<Vec<_>>();
        assert_eq!(texts.first().map(String::as_str), Some("message 1"));
        assert_eq!(texts.last().map(String::as_str), Some("message 100"));
        assert!(!texts.contains(&"message 0".to_string()));
    }

    #[test]
    fn context_excludes_the_trigger_and_is_bounded() {
        let mut history = HistoryBuffer::new(100);
        for index in 0..20 {
            history.push(inbound("Leo", &format!("line {index}")));
        }
        let context = history.context_before_latest(15);
        assert_eq!(context.len(), 15);
        assert_eq!(context[0].text, "line 4");
        assert_eq!(context[14].text, "line 18");

        let mut single = HistoryBuffer::new(10);
        single.push(inbound("Leo", "only"));
        assert!(single.context_before_latest(15).is_empty());
    }

    #[test]
    fn recent_returns_tail_oldest_first() {
        let mut history = HistoryBuffer::new(10);
        history.push(inbound("A", "1"));
        history.push(HistoryEntry::outbound(ChatEvent::outbound("Avatar Spirit", "2", 1)));
        history.push(inbound("B", "3"));
        let recent = history.recent(2);
        assert_eq!(recent[0].origin, HistoryOrigin::Outbound);
        assert_eq!(recent[1].event.text, "3");
    }

    #[test]
    fn dedup_matches_exact_pairs_within_window_only() {
        let mut dedup = DedupRecord::new(2);
        dedup.remember("Mia", "hi");
        assert!(dedup.is_duplicate("Mia", "hi"));
        assert!(!dedup.is_duplicate("Leo", "hi"));
        assert!(!dedup.is_duplicate("Mia", "hi!"));

        dedup.remember("Leo", "yo");
        dedup.remember("Ana", "hey");
        assert!(!dedup.is_duplicate("Mia", "hi"), "evicted from the window");
    }
}
