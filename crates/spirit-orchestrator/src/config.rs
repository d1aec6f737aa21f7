use std::time::Duration;

use spirit_browser::PlaybackStep;

pub const DEFAULT_ROOM_BASE_URL: &str = "https://www.free4talk.com";
pub const DEFAULT_GREETING: &str = "👋 Avatar Spirit Bot is active!";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Bounded wait per playback step.
pub struct PlaybackTimeouts {
    pub locate: Duration,
    pub open: Duration,
    pub search: Duration,
    pub results: Duration,
    pub play: Duration,
    pub stop: Duration,
}

impl Default for PlaybackTimeouts {
    fn default() -> Self {
        Self {
            locate: Duration::from_millis(2_000),
            open: Duration::from_millis(2_000),
            search: Duration::from_millis(2_000),
            results: Duration::from_millis(5_000),
            play: Duration::from_millis(2_000),
            stop: Duration::from_millis(2_000),
        }
    }
}

impl PlaybackTimeouts {
    pub fn for_step(&self, step: &PlaybackStep) -> Duration {
        match step {
            PlaybackStep::LocateControl => self.locate,
            PlaybackStep::OpenControl => self.open,
            PlaybackStep::SubmitSearch { .. } => self.search,
            PlaybackStep::AwaitResults => self.results,
            PlaybackStep::PlayFirstResult => self.play,
            PlaybackStep::Stop => self.stop,
        }
    }
}

#[derive(Debug, Clone)]
/// Every tunable of the session orchestrator.
pub struct OrchestratorConfig {
    pub room_base_url: String,
    /// Names the agent posts under; the first is used as its author in history.
    pub agent_display_names: Vec<String>,
    /// Authors whose events are never processed (service notices and the like).
    pub ignored_authors: Vec<String>,
    pub address_aliases: Vec<String>,
    pub command_sigil: char,
    pub action_keyword: String,
    pub action_exclusion: String,
    pub stop_patterns: Vec<String>,
    pub greeting: Option<String>,
    pub min_tenant_id_chars: usize,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub send_timeout: Duration,
    pub join_timeout: Duration,
    pub post_send_delay: Duration,
    pub teardown_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub max_consecutive_poll_failures: usize,
    pub history_capacity: usize,
    pub dedup_window: usize,
    pub context_window: usize,
    pub casual_reply_budget: usize,
    pub playback_timeouts: PlaybackTimeouts,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            room_base_url: DEFAULT_ROOM_BASE_URL.to_string(),
            agent_display_names: vec!["Avatar Spirit".to_string(), "AvatarSpiritBot".to_string()],
            ignored_authors: vec!["Free4Talk System".to_string()],
            address_aliases: vec!["avatar".to_string(), "spirit".to_string(), "bot".to_string()],
            command_sigil: '!',
            action_keyword: "play".to_string(),
            action_exclusion: "game".to_string(),
            stop_patterns: vec![
                "stop".to_string(),
                "close youtube".to_string(),
                "exit".to_string(),
            ],
            greeting: Some(DEFAULT_GREETING.to_string()),
            min_tenant_id_chars: 5,
            poll_interval: Duration::from_millis(2_000),
            poll_timeout: Duration::from_millis(5_000),
            send_timeout: Duration::from_millis(5_000),
            join_timeout: Duration::from_millis(30_000),
            post_send_delay: Duration::from_millis(1_500),
            teardown_timeout: Duration::from_millis(5_000),
            shutdown_timeout: Duration::from_millis(10_000),
            max_consecutive_poll_failures: 5,
            history_capacity: 100,
            dedup_window: 5,
            context_window: 15,
            casual_reply_budget: 120,
            playback_timeouts: PlaybackTimeouts::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn agent_name(&self) -> &str {
        self.agent_display_names
            .first()
            .map(String::as_str)
            .unwrap_or("Avatar Spirit")
    }

    pub fn is_self_authored(&self, author: &str) -> bool {
        let author = author.trim();
        self.agent_display_names.iter().any(|name| name == author)
    }

    pub fn is_ignored_author(&self, author: &str) -> bool {
        let author = author.trim();
        self.ignored_authors.iter().any(|name| name == author)
    }
}
