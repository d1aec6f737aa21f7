//! Wire bodies and the error envelope of the activation API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use spirit_orchestrator::{ActivationAck, ActivationRequest, DeactivationAck};

/// Error payload rendered as `{"error": <message>, "code": <code>}`.
#[derive(Debug)]
pub(super) struct ApiError {
    pub(super) status: StatusCode,
    pub(super) code: &'static str,
    pub(super) message: String,
}

impl ApiError {
    pub(super) fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub(super) fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub(super) fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, code, message)
    }

    pub(super) fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub(super) fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, "input_too_large", message)
    }

    pub(super) fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "error": self.message,
                "code": self.code,
            })),
        )
            .into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ActivateRequestBody {
    #[serde(default, alias = "subscriptionId")]
    pub(super) tenant_id: Option<String>,
    #[serde(default)]
    pub(super) room_link: Option<String>,
    #[serde(default, alias = "geminiKey")]
    pub(super) credential: Option<String>,
}

impl ActivateRequestBody {
    /// Absent fields become empty strings; the supervisor reports them as missing.
    pub(super) fn into_activation_request(self) -> ActivationRequest {
        ActivationRequest {
            tenant_id: self.tenant_id.unwrap_or_default(),
            room_link: self.room_link.unwrap_or_default(),
            credential: self.credential.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DeactivateRequestBody {
    #[serde(default, alias = "subscriptionId")]
    pub(super) tenant_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ActivateResponseBody {
    success: bool,
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'static str>,
    room_key: String,
}

impl ActivateResponseBody {
    pub(super) fn from_ack(ack: &ActivationAck) -> Self {
        let status = match ack {
            ActivationAck::Activated { .. } => None,
            ActivationAck::AlreadyActive { .. } => Some("already-active"),
        };
        Self {
            success: true,
            message: ack.message(),
            status,
            room_key: ack.room_key().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DeactivateResponseBody {
    success: bool,
    message: &'static str,
    tenant_id: String,
    room_key: String,
}

impl DeactivateResponseBody {
    pub(super) fn from_ack(ack: DeactivationAck) -> Self {
        Self {
            success: true,
            message: "Bot deactivated",
            tenant_id: ack.tenant_id,
            room_key: ack.room_key,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct BotSummaryBody {
    pub(super) subscription_id: String,
    pub(super) tenant_id: String,
    pub(super) room_key: String,
    pub(super) joined_at: String,
    pub(super) message_count: usize,
}

#[derive(Debug, Serialize)]
pub(super) struct BotsResponseBody {
    pub(super) bots: Vec<BotSummaryBody>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct HealthResponseBody {
    pub(super) status: &'static str,
    pub(super) active_bots: usize,
    pub(super) uptime: u64,
    pub(super) memory: String,
}

pub(super) fn render_joined_at(created_unix_ms: u64) -> String {
    i64::try_from(created_unix_ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|joined| joined.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}
