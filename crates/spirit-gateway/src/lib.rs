//! HTTP activation API for the Spirit session orchestrator.
//!
//! Exposes activate/deactivate, the active-session listing, and a health probe over
//! axum. All session semantics live in `spirit-orchestrator`; this crate only maps
//! wire bodies and error kinds.

mod activation_api;

pub use activation_api::{
    build_activation_router, run_activation_server, validate_activation_bind,
    ActivationServerConfig, ACTIVATE_ENDPOINT, BOTS_ENDPOINT, DEACTIVATE_ENDPOINT,
    HEALTH_ENDPOINT,
};
