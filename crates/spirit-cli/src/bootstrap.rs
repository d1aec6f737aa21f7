//! Maps CLI flags onto the runtime configuration of each crate.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use spirit_ai::{CompanionConfig, GoogleConfig, DEFAULT_PERSONA};
use spirit_browser::SidecarConfig;
use spirit_orchestrator::{OrchestratorConfig, DEFAULT_GREETING};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::cli_args::Cli;

pub(crate) fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

pub(crate) fn load_persona(path: Option<&Path>) -> Result<String> {
    let Some(path) = path else {
        return Ok(DEFAULT_PERSONA.to_string());
    };
    let persona = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read persona file {}", path.display()))?;
    let persona = persona.trim();
    if persona.is_empty() {
        bail!("persona file {} is empty", path.display());
    }
    Ok(persona.to_string())
}

pub(crate) fn build_orchestrator_config(cli: &Cli) -> OrchestratorConfig {
    let defaults = OrchestratorConfig::default();
    let agent_name = cli.agent_name.trim().to_string();
    let mut agent_display_names = vec![agent_name.clone()];
    agent_display_names.extend(
        defaults
            .agent_display_names
            .iter()
            .filter(|name| **name != agent_name)
            .cloned(),
    );
    let greeting = if cli.no_greeting {
        None
    } else {
        Some(
            cli.greeting
                .clone()
                .unwrap_or_else(|| DEFAULT_GREETING.to_string()),
        )
    };

    OrchestratorConfig {
        room_base_url: cli.room_base_url.trim().to_string(),
        agent_display_names,
        greeting,
        poll_interval: Duration::from_millis(cli.poll_interval_ms),
        post_send_delay: Duration::from_millis(cli.post_send_delay_ms),
        max_consecutive_poll_failures: cli.max_poll_failures,
        shutdown_timeout: Duration::from_millis(cli.shutdown_timeout_ms),
        ..defaults
    }
}

pub(crate) fn build_companion_config(cli: &Cli, persona: String) -> CompanionConfig {
    CompanionConfig {
        agent_name: cli.agent_name.trim().to_string(),
        persona,
        reply_model: cli.reply_model.clone(),
        suggestion_model: cli.suggestion_model.clone(),
        ..CompanionConfig::default()
    }
}

/// Tenant keys are filled in per request by the client factory.
pub(crate) fn build_google_config(cli: &Cli) -> GoogleConfig {
    GoogleConfig {
        api_base: cli.google_api_base.clone(),
        request_timeout_ms: cli.request_timeout_ms,
        ..GoogleConfig::default()
    }
}

pub(crate) fn build_sidecar_config(cli: &Cli) -> SidecarConfig {
    SidecarConfig {
        executable: cli.sidecar.clone(),
        args: cli.sidecar_args.clone(),
        ..SidecarConfig::default()
    }
}
