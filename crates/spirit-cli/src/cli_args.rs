use std::path::PathBuf;

use clap::{ArgAction, Parser};
use spirit_ai::{DEFAULT_GOOGLE_API_BASE, DEFAULT_REPLY_MODEL, DEFAULT_SUGGESTION_MODEL};
use spirit_orchestrator::DEFAULT_ROOM_BASE_URL;

pub(crate) const DEFAULT_BIND_HOST: &str = "0.0.0.0";
pub(crate) const DEFAULT_BIND_PORT: u16 = 3000;

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "spirit",
    about = "Multi-tenant chat-room companion agent with an HTTP activation API",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long = "encryption-key",
        env = "SPIRIT_ENCRYPTION_KEY",
        hide_env_values = true,
        help = "Base secret the credential vault derives its key from (at least 8 characters)"
    )]
    pub encryption_key: String,

    #[arg(
        long,
        env = "SPIRIT_BIND",
        help = "Socket address for the activation API; defaults to 0.0.0.0:$PORT or 0.0.0.0:3000"
    )]
    pub bind: Option<String>,

    #[arg(
        long = "template-path",
        env = "SPIRIT_TEMPLATE_PATH",
        default_value = "auth-state.json",
        help = "Persisted authenticated session template cloned into every room session"
    )]
    pub template_path: PathBuf,

    #[arg(
        long = "setup-template",
        env = "SPIRIT_SETUP_TEMPLATE",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Capture the session template interactively when it does not exist yet"
    )]
    pub setup_template: bool,

    #[arg(
        long = "sidecar",
        env = "SPIRIT_SIDECAR",
        default_value = "spirit-room-sidecar",
        help = "Room automation sidecar executable"
    )]
    pub sidecar: String,

    #[arg(
        long = "sidecar-arg",
        env = "SPIRIT_SIDECAR_ARGS",
        value_delimiter = ',',
        allow_hyphen_values = true,
        help = "Extra arguments passed to the sidecar executable"
    )]
    pub sidecar_args: Vec<String>,

    #[arg(
        long = "room-base-url",
        env = "SPIRIT_ROOM_BASE_URL",
        default_value = DEFAULT_ROOM_BASE_URL,
        help = "Base URL room links are resolved against"
    )]
    pub room_base_url: String,

    #[arg(
        long = "google-api-base",
        env = "SPIRIT_GOOGLE_API_BASE",
        default_value = DEFAULT_GOOGLE_API_BASE,
        help = "Base URL for the Gemini generateContent API"
    )]
    pub google_api_base: String,

    #[arg(
        long = "reply-model",
        env = "SPIRIT_REPLY_MODEL",
        default_value = DEFAULT_REPLY_MODEL,
        help = "Model used for conversational replies"
    )]
    pub reply_model: String,

    #[arg(
        long = "suggestion-model",
        env = "SPIRIT_SUGGESTION_MODEL",
        default_value = DEFAULT_SUGGESTION_MODEL,
        help = "Model used for !suggest"
    )]
    pub suggestion_model: String,

    #[arg(
        long = "request-timeout-ms",
        env = "SPIRIT_REQUEST_TIMEOUT_MS",
        default_value_t = 20_000,
        value_parser = parse_positive_u64,
        help = "Per-request timeout for the AI provider"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "agent-name",
        env = "SPIRIT_AGENT_NAME",
        default_value = "Avatar Spirit",
        help = "Display name the agent speaks as; its own messages are never processed"
    )]
    pub agent_name: String,

    #[arg(
        long = "persona-file",
        env = "SPIRIT_PERSONA_FILE",
        help = "Plain-text persona prompt replacing the built-in neutral persona"
    )]
    pub persona_file: Option<PathBuf>,

    #[arg(
        long,
        env = "SPIRIT_GREETING",
        help = "Line sent once after joining a room"
    )]
    pub greeting: Option<String>,

    #[arg(
        long = "no-greeting",
        env = "SPIRIT_NO_GREETING",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Join rooms silently"
    )]
    pub no_greeting: bool,

    #[arg(
        long = "poll-interval-ms",
        env = "SPIRIT_POLL_INTERVAL_MS",
        default_value_t = 2_000,
        value_parser = parse_positive_u64,
        help = "Interval between room polls per session"
    )]
    pub poll_interval_ms: u64,

    #[arg(
        long = "post-send-delay-ms",
        env = "SPIRIT_POST_SEND_DELAY_MS",
        default_value_t = 1_500,
        help = "Pause after each sent line before the next one"
    )]
    pub post_send_delay_ms: u64,

    #[arg(
        long = "max-poll-failures",
        env = "SPIRIT_MAX_POLL_FAILURES",
        default_value_t = 5,
        value_parser = parse_positive_usize,
        help = "Consecutive poll failures after which a session is torn down"
    )]
    pub max_poll_failures: usize,

    #[arg(
        long = "shutdown-timeout-ms",
        env = "SPIRIT_SHUTDOWN_TIMEOUT_MS",
        default_value_t = 10_000,
        value_parser = parse_positive_u64,
        help = "Upper bound for stopping every session on shutdown"
    )]
    pub shutdown_timeout_ms: u64,
}

/// Explicit bind wins, then `PORT`, then the default port.
pub(crate) fn resolve_bind(bind: Option<&str>, port: Option<&str>) -> String {
    if let Some(bind) = bind.map(str::trim).filter(|bind| !bind.is_empty()) {
        return bind.to_string();
    }
    let port = port
        .and_then(|port| port.trim().parse::<u16>().ok())
        .unwrap_or(DEFAULT_BIND_PORT);
    format!("{DEFAULT_BIND_HOST}:{port}")
}
