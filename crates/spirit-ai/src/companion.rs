//! Companion service: persona-framed replies and seed-based suggestions on top of an
//! [`LlmClient`] built per tenant credential.

use std::sync::Arc;

use async_trait::async_trait;
use spirit_vault::DecryptedSecret;

use crate::{AiError, ChatRequest, LlmClient, Message};

pub const DEFAULT_PERSONA: &str = "You are Avatar Spirit, a friendly regular in a group voice-chat \
room. Answer casually and warmly in one or two short sentences unless someone asks for advice, \
in which case be helpful and complete. Never mention that you are an AI model.";
pub const DEFAULT_REPLY_MODEL: &str = "gemini-2.0-flash-lite";
pub const DEFAULT_SUGGESTION_MODEL: &str = "gemini-2.0-flash-exp";
pub const MAX_SUGGESTIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationLine {
    pub author: String,
    pub text: String,
}

impl ConversationLine {
    pub fn new(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The triggering line plus the context preceding it, oldest first.
pub struct CompanionReplyRequest {
    pub author: String,
    pub text: String,
    pub recent: Vec<ConversationLine>,
}

#[derive(Debug, Clone)]
pub struct CompanionConfig {
    pub agent_name: String,
    pub persona: String,
    pub reply_model: String,
    pub suggestion_model: String,
    pub max_reply_tokens: u32,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            agent_name: "Avatar Spirit".to_string(),
            persona: DEFAULT_PERSONA.to_string(),
            reply_model: DEFAULT_REPLY_MODEL.to_string(),
            suggestion_model: DEFAULT_SUGGESTION_MODEL.to_string(),
            max_reply_tokens: 512,
        }
    }
}

/// Produces a client bound to one tenant's API key.
pub trait LlmClientFactory: Send + Sync {
    fn client_for(&self, api_key: &str) -> Result<Arc<dyn LlmClient>, AiError>;
}

#[async_trait]
/// The AI collaborator as seen by the reply pipeline.
pub trait CompanionService: Send + Sync {
    async fn reply(
        &self,
        credential: &DecryptedSecret,
        request: &CompanionReplyRequest,
    ) -> Result<String, AiError>;

    /// Returns at most [`MAX_SUGGESTIONS`] entries in model order.
    async fn suggest(&self, credential: &DecryptedSecret, seed: &str)
        -> Result<Vec<String>, AiError>;
}

pub struct GeminiCompanion {
    factory: Arc<dyn LlmClientFactory>,
    config: CompanionConfig,
}

impl GeminiCompanion {
    pub fn new(factory: Arc<dyn LlmClientFactory>, config: CompanionConfig) -> Self {
        Self { factory, config }
    }

    pub fn config(&self) -> &CompanionConfig {
        &self.config
    }

    async fn complete_text(
        &self,
        credential: &DecryptedSecret,
        model: &str,
        messages: Vec<Message>,
    ) -> Result<String, AiError> {
        let client = self.factory.client_for(credential.expose())?;
        let response = client
            .complete(ChatRequest {
                model: model.to_string(),
                messages,
                max_tokens: Some(self.config.max_reply_tokens),
                temperature: None,
            })
            .await?;
        let text = response.message.text_content().trim().to_string();
        if text.is_empty() {
            return Err(AiError::InvalidResponse("completion was empty".to_string()));
        }
        Ok(text)
    }
}

#[async_trait]
impl CompanionService for GeminiCompanion {
    async fn reply(
        &self,
        credential: &DecryptedSecret,
        request: &CompanionReplyRequest,
    ) -> Result<String, AiError> {
        let messages = vec![
            Message::system(self.config.persona.clone()),
            Message::user(render_conversation_prompt(&self.config.agent_name, request)),
        ];
        self.complete_text(credential, &self.config.reply_model, messages)
            .await
    }

    async fn suggest(
        &self,
        credential: &DecryptedSecret,
        seed: &str,
    ) -> Result<Vec<String>, AiError> {
        let messages = vec![Message::user(render_suggestion_prompt(seed))];
        let raw = self
            .complete_text(credential, &self.config.suggestion_model, messages)
            .await?;
        Ok(parse_suggestion_lines(&raw, MAX_SUGGESTIONS))
    }
}

pub fn render_conversation_prompt(agent_name: &str, request: &CompanionReplyRequest) -> String {
    let dialog = request
        .recent
        .iter()
        .map(|line| format!("{}: {}", line.author, line.text))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Recent conversation:\n{dialog}\n\n{}: {}\n{agent_name}:",
        request.author, request.text
    )
}

fn render_suggestion_prompt(seed: &str) -> String {
    format!(
        "Based on the song \"{seed}\", suggest {MAX_SUGGESTIONS} similar songs that match the same \
mood, genre, and energy level.\n\nRules:\n- Only provide song names, no explanations\n- Format: \
one song per line\n- Include the artist name: \"Song Name - Artist Name\"\n- Only suggest songs \
that actually exist"
    )
}

/// Splits a completion into suggestion entries, dropping blanks and `N.` enumeration.
pub fn parse_suggestion_lines(raw: &str, limit: usize) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(strip_enumeration)
        .filter(|line| !line.is_empty())
        .take(limit)
        .map(str::to_string)
        .collect()
}

fn strip_enumeration(line: &str) -> &str {
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return line;
    }
    match line[digits..].strip_prefix('.') {
        Some(rest) => rest.trim_start(),
        None => line,
    }
}
