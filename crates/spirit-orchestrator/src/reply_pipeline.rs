//! Reply generation: AI-backed conversational replies with the casual length policy,
//! seed-based suggestions, and the scripted acknowledgments.

use std::sync::Arc;

use spirit_ai::{CompanionReplyRequest, CompanionService, ConversationLine};
use spirit_vault::DecryptedSecret;
use tracing::warn;

use crate::ChatEvent;

pub const PLAYBACK_FAILED_ACK: &str = "❌ Sorry, couldn't play that song";
pub const STOP_ACK: &str = "⏹️ Stopping music...";
pub const NO_SUGGESTIONS_ACK: &str = "🤔 I couldn't come up with suggestions right now.";
pub const HELP_TEXT: &str = "Avatar Spirit commands: mention me or ask a question to chat, \
\"play <song>\" to play music, \"stop\" to stop it, \"!suggest <song>\" for similar songs.";

const ELLIPSIS: &str = "...";
const ADVICE_MARKERS: [&str; 4] = ["advice", "help", "how do i", "what should i"];
const LONG_QUESTION_MIN_CHARS: usize = 20;

pub fn render_playback_started(query: &str) -> String {
    format!("🎵 Playing \"{query}\"...")
}

pub fn render_playback_succeeded(query: &str) -> String {
    format!("✅ Now playing: {query}")
}

pub fn render_suggestions(seed: &str, suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        return NO_SUGGESTIONS_ACK.to_string();
    }
    let mut lines = vec![format!("🎶 Songs like \"{seed}\":")];
    lines.extend(
        suggestions
            .iter()
            .enumerate()
            .map(|(index, suggestion)| format!("{}. {suggestion}", index + 1)),
    );
    lines.join("\n")
}

/// Heuristic: an advice keyword, or a question longer than 20 characters.
pub fn is_advice_request(text: &str) -> bool {
    let lowered = text.to_lowercase();
    ADVICE_MARKERS.iter().any(|marker| lowered.contains(marker))
        || (text.contains('?') && text.chars().count() > LONG_QUESTION_MIN_CHARS)
}

/// Truncates casual replies to `budget` characters ending in `...`; advice replies
/// pass through untouched. A budget too small for the ellipsis yields a bare prefix.
pub fn apply_length_policy(trigger: &str, reply: &str, budget: usize) -> String {
    if is_advice_request(trigger) || reply.chars().count() <= budget {
        return reply.to_string();
    }
    if budget < ELLIPSIS.len() {
        return reply.chars().take(budget).collect();
    }
    let keep = budget - ELLIPSIS.len();
    let mut truncated = reply.chars().take(keep).collect::<String>();
    truncated.push_str(ELLIPSIS);
    truncated
}

pub struct ReplyPipeline {
    companion: Arc<dyn CompanionService>,
    casual_reply_budget: usize,
}

impl ReplyPipeline {
    pub fn new(companion: Arc<dyn CompanionService>, casual_reply_budget: usize) -> Self {
        Self {
            companion,
            casual_reply_budget,
        }
    }

    /// Returns the text to send for `trigger`, or `None` when the companion failed.
    pub async fn conversational_reply(
        &self,
        credential: &DecryptedSecret,
        trigger: &ChatEvent,
        context: Vec<ConversationLine>,
    ) -> Option<String> {
        let request = CompanionReplyRequest {
            author: trigger.author.clone(),
            text: trigger.text.clone(),
            recent: context,
        };
        match self.companion.reply(credential, &request).await {
            Ok(reply) => Some(apply_length_policy(
                &trigger.text,
                &reply,
                self.casual_reply_budget,
            )),
            Err(error) => {
                warn!(author = %trigger.author, error = %error, "companion reply failed; staying silent");
                None
            }
        }
    }

    pub async fn suggestions(&self, credential: &DecryptedSecret, seed: &str) -> String {
        match self.companion.suggest(credential, seed).await {
            Ok(suggestions) => render_suggestions(seed, &suggestions),
            Err(error) => {
                warn!(seed = %seed, error = %error, "companion suggestions failed");
                NO_SUGGESTIONS_ACK.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use spirit_ai::{AiError, CompanionReplyRequest, CompanionService};
    use spirit_vault::{CredentialVault, DecryptedSecret};

    use super::{
        apply_length_policy, is_advice_request, render_suggestions, ReplyPipeline,
        NO_SUGGESTIONS_ACK,
    };
    use crate::ChatEvent;

    struct FailingCompanion;

    #[async_trait]
    impl CompanionService for FailingCompanion {
        async fn reply(
            &self,
            _credential: &DecryptedSecret,
            _request: &CompanionReplyRequest,
        ) -> Result<String, AiError> {
            Err(AiError::InvalidResponse("boom".to_string()))
        }

        async fn suggest(
            &self,
            _credential: &DecryptedSecret,
            _seed: &str,
        ) -> Result<Vec<String>, AiError> {
            Err(AiError::MissingApiKey)
        }
    }

    fn credential() -> DecryptedSecret {
        let vault = CredentialVault::new("pipeline-test-base").expect("vault");
        vault.open(&vault.seal("key").expect("seal")).expect("open")
    }

    #[test]
    fn casual_reply_of_140_chars_is_cut_to_120_with_ellipsis() {
        let reply = "x".repeat(140);
        let sent = apply_length_policy("hey bot", &reply, 120);
        assert_eq!(sent.chars().count(), 120);
        assert!(sent.ends_with("..."));
    }

    #[test]
    fn advice_request_reply_is_sent_unmodified() {
        let reply = "y".repeat(140);
        let sent = apply_length_policy("spirit how do i fix my sleep", &reply, 120);
        assert_eq!(sent, reply);
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let reply = "é".repeat(130);
        let sent = apply_length_policy("hi bot", &reply, 120);
        assert_eq!(sent.chars().count(), 120);
    }

    #[test]
    fn tiny_budgets_never_exceed_the_budget() {
        assert_eq!(apply_length_policy("hi bot", "hello there", 0), "");
        assert_eq!(apply_length_policy("hi bot", "hello there", 2), "he");
        assert_eq!(apply_length_policy("hi bot", "hello there", 3), "...");
        assert_eq!(apply_length_policy("hi bot", "hello there", 4), "h...");
    }

    #[test]
    fn advice_heuristic_matches_keywords_and_long_questions() {
        assert!(is_advice_request("I need ADVICE"));
        assert!(is_advice_request("what should i eat"));
        assert!(is_advice_request("is it going to rain tomorrow?"));
        assert!(!is_advice_request("you there bot?"));
        assert!(!is_advice_request("hello spirit"));
    }

    #[test]
    fn suggestions_render_as_numbered_list() {
        let rendered = render_suggestions(
            "Holocene",
            &["Flume - Bon Iver".to_string(), "Re: Stacks - Bon Iver".to_string()],
        );
        assert_eq!(
            rendered,
            "🎶 Songs like \"Holocene\":\n1. Flume - Bon Iver\n2. Re: Stacks - Bon Iver"
        );
        assert_eq!(render_suggestions("x", &[]), NO_SUGGESTIONS_ACK);
    }

    #[tokio::test]
    async fn companion_failures_yield_silence_or_fallback() {
        let pipeline = ReplyPipeline::new(Arc::new(FailingCompanion), 120);
        let trigger = ChatEvent::outbound("Mia", "bot?", 0);
        assert_eq!(
            pipeline
                .conversational_reply(&credential(), &trigger, Vec::new())
                .await,
            None
        );
        assert_eq!(
            pipeline.suggestions(&credential(), "Holocene").await,
            NO_SUGGESTIONS_ACK
        );
    }
}
