use regex::Regex;

use crate::{ChatEvent, OrchestratorConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Where one inbound event goes. Exactly one route per event.
pub enum Route {
    Ignore,
    SkipPrivate,
    Converse,
    Play { query: String },
    Stop,
    Help,
    Suggest { seed: String },
}

#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    aliases: Vec<String>,
    sigil: char,
    action_keyword: String,
    action_exclusion: String,
    stop_patterns: Vec<String>,
    play_pattern: Option<Regex>,
}

impl CommandDispatcher {
    pub fn new(config: &OrchestratorConfig) -> Self {
        let action_keyword = config.action_keyword.trim().to_lowercase();
        let play_pattern = if action_keyword.is_empty() {
            None
        } else {
            Regex::new(&format!(r"(?i){}\s+(.+)", regex::escape(&action_keyword))).ok()
        };
        Self {
            aliases: lowercase_all(&config.address_aliases),
            sigil: config.command_sigil,
            action_keyword,
            action_exclusion: config.action_exclusion.trim().to_lowercase(),
            stop_patterns: lowercase_all(&config.stop_patterns),
            play_pattern,
        }
    }

    /// Responsiveness gate: alias mention, a question mark, a leading sigil, or the
    /// action keyword anywhere in the text.
    pub fn should_respond(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.aliases.iter().any(|alias| lowered.contains(alias))
            || text.contains('?')
            || text.starts_with(self.sigil)
            || (!self.action_keyword.is_empty() && lowered.contains(&self.action_keyword))
    }

    pub fn classify(&self, event: &ChatEvent) -> Route {
        if event.is_private && event.has_quote {
            return Route::SkipPrivate;
        }
        let text = event.text.trim();
        if !self.should_respond(text) {
            return Route::Ignore;
        }
        if let Some(route) = self.classify_sigil_command(text) {
            return route;
        }

        let lowered = text.to_lowercase();
        if self.is_action_request(&lowered) {
            if let Some(query) = self.extract_play_query(text) {
                return Route::Play { query };
            }
        }
        if self
            .stop_patterns
            .iter()
            .any(|pattern| lowered.contains(pattern))
        {
            return Route::Stop;
        }
        Route::Converse
    }

    fn is_action_request(&self, lowered: &str) -> bool {
        !self.action_keyword.is_empty()
            && lowered.contains(&self.action_keyword)
            && (self.action_exclusion.is_empty() || !lowered.contains(&self.action_exclusion))
    }

    fn extract_play_query(&self, text: &str) -> Option<String> {
        let query = self
            .play_pattern
            .as_ref()?
            .captures(text)?
            .get(1)?
            .as_str()
            .trim();
        (!query.is_empty()).then(|| query.to_string())
    }

    fn classify_sigil_command(&self, text: &str) -> Option<Route> {
        let rest = text.strip_prefix(self.sigil)?;
        let mut parts = rest.splitn(2, char::is_whitespace);
        let command = parts.next().unwrap_or_default().to_lowercase();
        let remainder = parts.next().unwrap_or_default().trim();
        match command.as_str() {
            "help" => Some(Route::Help),
            "suggest" if remainder.is_empty() => Some(Route::Help),
            "suggest" => Some(Route::Suggest {
                seed: remainder.to_string(),
            }),
            _ => None,
        }
    }
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty())
        .collect()
}
