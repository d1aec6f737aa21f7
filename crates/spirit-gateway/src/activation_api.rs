use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use spirit_core::{current_unix_timestamp_ms, elapsed_seconds_since};
use spirit_orchestrator::{ActivationError, SessionSupervisor, ValidationError};
use tokio::net::TcpListener;
use tracing::{info, warn};

mod health;
mod types;

use health::resident_memory_label;
use types::{
    render_joined_at, ActivateRequestBody, ActivateResponseBody, ApiError, BotSummaryBody,
    BotsResponseBody, DeactivateRequestBody, DeactivateResponseBody, HealthResponseBody,
};

pub const ACTIVATE_ENDPOINT: &str = "/api/activate";
pub const DEACTIVATE_ENDPOINT: &str = "/api/deactivate";
pub const BOTS_ENDPOINT: &str = "/api/bots";
pub const HEALTH_ENDPOINT: &str = "/health";

const MAX_REQUEST_BODY_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationServerConfig {
    pub bind: String,
}

struct ActivationApiState {
    supervisor: Arc<SessionSupervisor>,
    started_unix_ms: u64,
}

/// Serves the activation API until `shutdown` resolves. Sessions are left running; the
/// caller decides when to stop them.
pub async fn run_activation_server<F>(
    config: ActivationServerConfig,
    supervisor: Arc<SessionSupervisor>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let bind_addr = validate_activation_bind(&config.bind)?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind activation server on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound activation server address")?;
    info!(addr = %local_addr, endpoint = ACTIVATE_ENDPOINT, "activation server listening");

    let app = build_activation_router(supervisor);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("activation server exited unexpectedly")?;
    info!("activation server stopped");
    Ok(())
}

pub fn build_activation_router(supervisor: Arc<SessionSupervisor>) -> Router {
    let state = Arc::new(ActivationApiState {
        supervisor,
        started_unix_ms: current_unix_timestamp_ms(),
    });
    Router::new()
        .route(ACTIVATE_ENDPOINT, post(handle_activate))
        .route(DEACTIVATE_ENDPOINT, post(handle_deactivate))
        .route(BOTS_ENDPOINT, get(handle_bots))
        .route(HEALTH_ENDPOINT, get(handle_health))
        .with_state(state)
}

pub fn validate_activation_bind(bind: &str) -> Result<SocketAddr> {
    bind.trim()
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid activation server socket address '{bind}'"))
}

async fn handle_activate(State(state): State<Arc<ActivationApiState>>, body: Bytes) -> Response {
    let request = match parse_json_body::<ActivateRequestBody>(&body) {
        Ok(request) => request.into_activation_request(),
        Err(error) => return error.into_response(),
    };
    info!(tenant_id = %request.tenant_id.trim(), "activation request");

    match state.supervisor.activate(request).await {
        Ok(ack) => Json(ActivateResponseBody::from_ack(&ack)).into_response(),
        Err(error) => {
            if !matches!(error, ActivationError::Validation(_)) {
                warn!(error = %error, "activation failed");
            }
            activation_error_response(error).into_response()
        }
    }
}

async fn handle_deactivate(
    State(state): State<Arc<ActivationApiState>>,
    body: Bytes,
) -> Response {
    let request = match parse_json_body::<DeactivateRequestBody>(&body) {
        Ok(request) => request,
        Err(error) => return error.into_response(),
    };
    let tenant_id = request.tenant_id.unwrap_or_default();
    if tenant_id.trim().is_empty() {
        return ApiError::bad_request("missing_fields", "Missing subscription ID").into_response();
    }

    match state.supervisor.deactivate(&tenant_id).await {
        Ok(ack) => Json(DeactivateResponseBody::from_ack(ack)).into_response(),
        Err(error) => {
            info!(tenant_id = %error.tenant_id, "deactivation for unknown tenant");
            ApiError::not_found("Bot not found").into_response()
        }
    }
}

async fn handle_bots(State(state): State<Arc<ActivationApiState>>) -> Json<BotsResponseBody> {
    let bots = state
        .supervisor
        .list()
        .into_iter()
        .map(|summary| BotSummaryBody {
            subscription_id: summary.tenant_id.clone(),
            joined_at: render_joined_at(summary.created_unix_ms),
            tenant_id: summary.tenant_id,
            room_key: summary.room_key,
            message_count: summary.history_len,
        })
        .collect();
    Json(BotsResponseBody { bots })
}

async fn handle_health(State(state): State<Arc<ActivationApiState>>) -> Json<HealthResponseBody> {
    Json(HealthResponseBody {
        status: "ok",
        active_bots: state.supervisor.active_count(),
        uptime: elapsed_seconds_since(state.started_unix_ms),
        memory: resident_memory_label(),
    })
}

fn parse_json_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    if body.len() > MAX_REQUEST_BODY_BYTES {
        return Err(ApiError::payload_too_large(format!(
            "request body exceeds max size of {MAX_REQUEST_BODY_BYTES} bytes"
        )));
    }
    serde_json::from_slice::<T>(body).map_err(|error| {
        ApiError::bad_request(
            "malformed_json",
            format!("failed to parse request body: {error}"),
        )
    })
}

fn activation_error_response(error: ActivationError) -> ApiError {
    match error {
        ActivationError::Validation(ValidationError::InvalidTenant) => {
            ApiError::unauthorized("invalid_tenant", ValidationError::InvalidTenant.to_string())
        }
        ActivationError::Validation(error @ ValidationError::MissingField(_)) => {
            ApiError::bad_request("missing_fields", error.to_string())
        }
        ActivationError::Validation(error @ ValidationError::InvalidTarget) => {
            ApiError::bad_request("invalid_room_link", error.to_string())
        }
        ActivationError::HandleOpen(error) => ApiError::internal(
            "activation_failed",
            format!("Failed to activate bot: {error}"),
        ),
        ActivationError::Crypto(error) => ApiError::internal(
            "credential_seal_failed",
            format!("Failed to activate bot: {error}"),
        ),
    }
}
