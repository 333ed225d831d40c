//! Web server module for handling Slack webhooks.
//!
//! This module provides a thin web server that:
//! - Verifies the Slack request signature
//! - Installs the decoded payload in the request context
//! - Schedules the response as a detached task
//! - Returns 200 OK well inside Slack's three second window

pub mod handlers;
pub mod middleware;
pub mod signature;

use axum::{
    middleware::from_fn_with_state,
    routing::{any, get},
    Router,
};

pub use handlers::{health, interaction_callback, slash_command, AppState, HealthResponse};
pub use middleware::{
    respond_async, verify_interaction_callback, verify_slash_command, VerifyHooks, VerifyState,
    WebhookResponse,
};
pub use signature::{compute_signature, SignatureVerifier, SigningSecret};

/// Build the application router.
///
/// Webhook routes accept any method so that non-POST requests are rejected
/// by verification with `405`.
pub fn router(state: AppState) -> Router {
    let commands = Router::new()
        .route("/slack/commands/*path", any(slash_command))
        .route_layer(from_fn_with_state(state.verify.clone(), verify_slash_command));

    let interactions = Router::new()
        .route("/slack/interactions", any(interaction_callback))
        .route_layer(from_fn_with_state(state.verify.clone(), verify_interaction_callback));

    Router::new()
        .route("/health", get(health))
        .merge(commands)
        .merge(interactions)
        .with_state(state)
}
