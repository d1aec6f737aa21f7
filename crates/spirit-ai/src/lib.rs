//! AI collaborator surface for Spirit: LLM client seam, Gemini client, and the
//! companion service that turns chat context into replies and suggestions.
mod companion;
mod google;
mod retry;
mod types;

pub use companion::{
    parse_suggestion_lines, render_conversation_prompt, CompanionConfig, CompanionReplyRequest,
    CompanionService, ConversationLine, GeminiCompanion, LlmClientFactory, DEFAULT_PERSONA,
    DEFAULT_REPLY_MODEL, DEFAULT_SUGGESTION_MODEL, MAX_SUGGESTIONS,
};
pub use google::{GoogleClient, GoogleClientFactory, GoogleConfig, DEFAULT_GOOGLE_API_BASE};
pub use types::{AiError, ChatRequest, ChatResponse, ChatUsage, LlmClient, Message, MessageRole};
