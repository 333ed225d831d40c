//! Slack endpoint handlers.
//!
//! These handlers are designed to return well inside Slack's three second
//! window - they only:
//! 1. Read the verified payload from the request context
//! 2. Schedule the real response as a detached task
//! 3. Return 200 OK
//!
//! The scheduled response acknowledges the user with an ephemeral message.

use std::sync::Arc;

use anyhow::{anyhow, Context as _};
use axum::{
    extract::{Extension, OriginalUri, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::info;

use crate::context::Context;
use crate::notify::{Message, MessagingClient};
use crate::payload::{InteractionCallback, SlashCommand};
use crate::respond::Responder;
use crate::web::middleware::{VerifyState, WebhookResponse};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub responder: Responder,
    pub verify: VerifyState,
    pub slack: Option<Arc<dyn MessagingClient>>,
}

impl AppState {
    pub fn new(
        responder: Responder,
        verify: VerifyState,
        slack: Option<Arc<dyn MessagingClient>>,
    ) -> Self {
        Self {
            responder,
            verify,
            slack,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Slash Commands
// =============================================================================

/// Slash command endpoint. Runs behind `verify_slash_command`.
pub async fn slash_command(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    ctx: Option<Extension<Context>>,
) -> Response {
    let ctx = ctx.map(|Extension(ctx)| ctx).unwrap_or_default();
    let endpoint = uri.path();
    let slack = state.slack.clone();

    let scheduled = state
        .responder
        .respond_slash(&ctx, endpoint, move |ctx, cmd| acknowledge_command(ctx, slack, cmd));

    match scheduled {
        Ok(handle) => {
            info!(
                endpoint = %handle.endpoint(),
                budget_ms = handle.budget().as_millis() as u64,
                "slash_command_accepted"
            );
            accepted()
        }
        Err(e) => e.into_response(),
    }
}

async fn acknowledge_command(
    ctx: Context,
    slack: Option<Arc<dyn MessagingClient>>,
    cmd: SlashCommand,
) -> anyhow::Result<()> {
    let slack = slack.ok_or_else(|| anyhow!("SLACK_BOT_TOKEN not configured"))?;

    let text = if cmd.text.is_empty() {
        format!("Working on `{}`", cmd.command)
    } else {
        format!("Working on `{} {}`", cmd.command, cmd.text)
    };

    let message = Message::text(text);
    tokio::select! {
        result = slack.post_ephemeral(&cmd.channel_id, &cmd.user_id, &message) => {
            result.context("failed to acknowledge slash command")?;
        }
        _ = ctx.done() => {
            return Err(anyhow!("{}", ctx.err().map(|e| e.to_string()).unwrap_or_default()));
        }
    }

    Ok(())
}

// =============================================================================
// Interaction Callbacks
// =============================================================================

/// Interaction callback endpoint. Runs behind `verify_interaction_callback`.
pub async fn interaction_callback(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    ctx: Option<Extension<Context>>,
) -> Response {
    let ctx = ctx.map(|Extension(ctx)| ctx).unwrap_or_default();
    let endpoint = uri.path();
    let slack = state.slack.clone();

    let scheduled = state.responder.respond_callback(&ctx, endpoint, move |ctx, callback| {
        acknowledge_callback(ctx, slack, callback)
    });

    match scheduled {
        Ok(handle) => {
            info!(
                endpoint = %handle.endpoint(),
                budget_ms = handle.budget().as_millis() as u64,
                "interaction_callback_accepted"
            );
            accepted()
        }
        Err(e) => e.into_response(),
    }
}

async fn acknowledge_callback(
    ctx: Context,
    slack: Option<Arc<dyn MessagingClient>>,
    callback: InteractionCallback,
) -> anyhow::Result<()> {
    let slack = slack.ok_or_else(|| anyhow!("SLACK_BOT_TOKEN not configured"))?;

    let actions: Vec<&str> = callback
        .action_callback
        .block_actions
        .iter()
        .map(|a| a.action_id.as_str())
        .chain(callback.action_callback.attachment_actions.iter().map(|a| a.name.as_str()))
        .collect();

    let text = if actions.is_empty() {
        format!("Received `{}`", callback.callback_id)
    } else {
        format!("Received `{}`", actions.join("`, `"))
    };

    let message = Message::text(text);
    tokio::select! {
        result = slack.post_ephemeral(&callback.channel.id, &callback.user.id, &message) => {
            result.context("failed to acknowledge interaction")?;
        }
        _ = ctx.done() => {
            return Err(anyhow!("{}", ctx.err().map(|e| e.to_string()).unwrap_or_default()));
        }
    }

    Ok(())
}

fn accepted() -> Response {
    (
        StatusCode::OK,
        Json(WebhookResponse {
            status: "accepted",
            error: None,
        }),
    )
        .into_response()
}
