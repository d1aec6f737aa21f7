//! Process wiring: template preflight, collaborator construction, serve, shutdown.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use spirit_ai::{GeminiCompanion, GoogleClientFactory};
use spirit_browser::{RoomAutomation, SessionTemplate, SessionTemplateStore, SidecarRoomAutomation};
use spirit_gateway::{run_activation_server, ActivationServerConfig};
use spirit_orchestrator::SessionSupervisor;
use spirit_vault::CredentialVault;
use tracing::{info, warn};

use crate::bootstrap::{
    build_companion_config, build_google_config, build_orchestrator_config, build_sidecar_config,
    load_persona,
};
use crate::cli_args::{resolve_bind, Cli};

pub(crate) async fn run_spirit(cli: Cli) -> Result<()> {
    let vault = CredentialVault::new(&cli.encryption_key)
        .context("invalid --encryption-key / SPIRIT_ENCRYPTION_KEY")?;
    let persona = load_persona(cli.persona_file.as_deref())?;
    let automation = SidecarRoomAutomation::new(build_sidecar_config(&cli))
        .context("failed to configure room automation sidecar")?;
    let store = SessionTemplateStore::new(cli.template_path.clone());
    let template = prepare_session_template(&store, &automation, cli.setup_template).await?;

    let factory = Arc::new(GoogleClientFactory::new(build_google_config(&cli)));
    let companion = Arc::new(GeminiCompanion::new(
        factory,
        build_companion_config(&cli, persona),
    ));
    let supervisor = Arc::new(SessionSupervisor::new(
        build_orchestrator_config(&cli),
        Arc::new(vault),
        Arc::new(automation),
        template,
        companion,
    ));

    let port = std::env::var("PORT").ok();
    let server_config = ActivationServerConfig {
        bind: resolve_bind(cli.bind.as_deref(), port.as_deref()),
    };
    let served = run_activation_server(server_config, supervisor.clone(), shutdown_signal()).await;

    let report = supervisor.shutdown_all().await;
    info!(
        stopped = report.stopped,
        forced = report.forced,
        "all sessions stopped"
    );
    served
}

/// Loads the persisted template, capturing it first when setup is requested and no
/// template exists yet.
pub(crate) async fn prepare_session_template(
    store: &SessionTemplateStore,
    automation: &dyn RoomAutomation,
    setup_template: bool,
) -> Result<SessionTemplate> {
    if !store.exists() {
        if !setup_template {
            bail!(
                "session template {} not found; run once with --setup-template to capture it",
                store.path().display()
            );
        }
        info!(path = %store.path().display(), "capturing session template; complete the login in the opened browser");
        let template = automation
            .capture_template()
            .await
            .context("session template capture failed")?;
        store.save(&template)?;
        info!(path = %store.path().display(), "session template saved");
        return Ok(template);
    }
    if setup_template {
        warn!(path = %store.path().display(), "session template already exists; skipping capture");
    }
    store.load()
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "failed to listen for ctrl-c; serving until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use spirit_browser::{ScriptedRoomAutomation, SessionTemplate, SessionTemplateStore};

    use super::prepare_session_template;

    #[tokio::test]
    async fn missing_template_without_setup_refuses_to_start() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SessionTemplateStore::new(temp.path().join("auth-state.json"));
        let error = prepare_session_template(&store, &ScriptedRoomAutomation::new(), false)
            .await
            .expect_err("missing template");
        assert!(error.to_string().contains("--setup-template"));
    }

    #[tokio::test]
    async fn setup_captures_and_persists_template_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SessionTemplateStore::new(temp.path().join("auth-state.json"));
        let captured = SessionTemplate::new(json!({ "cookies": [{ "name": "sid" }] }));
        let automation = ScriptedRoomAutomation::new().with_captured_template(captured.clone());

        let template = prepare_session_template(&store, &automation, true)
            .await
            .expect("setup");
        assert_eq!(template, captured);
        assert!(store.exists());

        let other = ScriptedRoomAutomation::new()
            .with_captured_template(SessionTemplate::new(json!({ "cookies": [] })));
        let reloaded = prepare_session_template(&store, &other, true)
            .await
            .expect("reload");
        assert_eq!(reloaded, captured);
    }

    #[tokio::test]
    async fn failed_capture_leaves_no_template_behind() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SessionTemplateStore::new(temp.path().join("auth-state.json"));
        assert!(prepare_session_template(&store, &ScriptedRoomAutomation::new(), true)
            .await
            .is_err());
        assert!(!store.exists());
    }
}
