use serde::Serialize;
use spirit_browser::HandleError;
use spirit_vault::CryptoError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
/// Successful outcome of an activation request.
pub enum ActivationAck {
    Activated { room_key: String },
    /// The tenant already has a session in this room; nothing was created.
    AlreadyActive { room_key: String },
}

impl ActivationAck {
    pub fn room_key(&self) -> &str {
        match self {
            Self::Activated { room_key } | Self::AlreadyActive { room_key } => room_key,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Activated { .. } => "Bot activated successfully!",
            Self::AlreadyActive { .. } => "Bot is already active in this room!",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeactivationAck {
    pub tenant_id: String,
    pub room_key: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required fields: {0}")]
    MissingField(&'static str),
    #[error("Invalid subscription ID")]
    InvalidTenant,
    #[error("Invalid room link")]
    InvalidTarget,
}

#[derive(Debug, Error)]
pub enum ActivationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to open room session: {0}")]
    HandleOpen(#[from] HandleError),
    #[error("failed to seal tenant credential: {0}")]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("No active bot for subscription '{tenant_id}'")]
pub struct NotFoundError {
    pub tenant_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Why a session worker stopped.
pub enum SessionExit {
    Cancelled,
    HandleClosed,
    TransientExhausted { failures: usize },
}

impl SessionExit {
    /// Exits the worker reaps itself for, rather than being torn down from outside.
    pub fn is_fatal(self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}
