//! Request verification and async-acknowledge middleware.
//!
//! The verification middleware buffers the body, checks the Slack signature,
//! decodes the payload and installs it in the request's [`Context`] before
//! the downstream handler runs. Failed requests never reach the handler.

use std::sync::Arc;

use axum::{
    body::{self, Body},
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::context::Context;
use crate::error::Error;
use crate::payload::{
    decode_interaction_callback, decode_slash_command, InteractionCallback, SlashCommand,
};
use crate::web::signature::{check_method, SignatureVerifier};

/// Largest body the verification middleware will buffer.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

pub type SlashCommandHook = Arc<dyn Fn(&SlashCommand) + Send + Sync>;
pub type InteractionCallbackHook = Arc<dyn Fn(&InteractionCallback) + Send + Sync>;
pub type FailureHook = Arc<dyn Fn(&str, &Error) + Send + Sync>;

/// Optional callbacks run by the verification middleware.
#[derive(Clone, Default)]
pub struct VerifyHooks {
    /// Runs after a slash command verified and decoded.
    pub on_slash_command: Option<SlashCommandHook>,
    /// Runs after an interaction callback verified and decoded.
    pub on_interaction_callback: Option<InteractionCallbackHook>,
    /// Runs with the request path and error when a request is rejected.
    pub on_failure: Option<FailureHook>,
}

/// State shared by the verification middleware.
#[derive(Clone)]
pub struct VerifyState {
    pub verifier: Arc<SignatureVerifier>,
    pub hooks: VerifyHooks,
}

impl VerifyState {
    pub fn new(verifier: SignatureVerifier) -> Self {
        Self {
            verifier: Arc::new(verifier),
            hooks: VerifyHooks::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: VerifyHooks) -> Self {
        self.hooks = hooks;
        self
    }

    fn fail(&self, path: &str, err: Error) -> Response {
        if let Some(hook) = &self.hooks.on_failure {
            hook(path, &err);
        }
        err.into_response()
    }
}

/// JSON body for webhook responses.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Error {
    /// HTTP status the web layer answers with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Error::MalformedHeader(_) | Error::Replay { .. } | Error::SignatureMismatch { .. } => {
                StatusCode::UNAUTHORIZED
            }
            Error::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            Error::PayloadNotFound(_) | Error::SlackApi(_) | Error::NotificationDelivery(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Authentication failures get no detail; the computed signature
        // stays in the logs.
        let body = if self.is_authentication() {
            WebhookResponse {
                status: "unauthorized",
                error: None,
            }
        } else {
            WebhookResponse {
                status: "error",
                error: Some(self.to_string()),
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Buffer the body and verify it. Returns the rebuilt request parts, the
/// body bytes and the request context to extend.
async fn verified_body(
    state: &VerifyState,
    request: Request,
) -> Result<(axum::http::request::Parts, body::Bytes, Context), Error> {
    let (parts, body) = request.into_parts();

    // Reject by method before reading a body of any size.
    check_method(&parts.method)?;

    let bytes = body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| Error::MalformedPayload(format!("failed to read body: {}", e)))?;

    state
        .verifier
        .verify_request(&parts.method, &parts.headers, &bytes)?;

    let ctx = parts.extensions.get::<Context>().cloned().unwrap_or_default();

    Ok((parts, bytes, ctx))
}

/// Verify a slash command and install it in the request context.
///
/// The installed context is cancelled once the downstream handler returns.
pub async fn verify_slash_command(
    State(state): State<VerifyState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let (mut parts, bytes, ctx) = match verified_body(&state, request).await {
        Ok(verified) => verified,
        Err(e) => return state.fail(&path, e),
    };

    let cmd = match decode_slash_command(&bytes) {
        Ok(cmd) => cmd,
        Err(e) => return state.fail(&path, e),
    };

    info!(
        path = %path,
        command = %cmd.command,
        user_id = %cmd.user_id,
        "slack_slash_command_verified"
    );

    if let Some(hook) = &state.hooks.on_slash_command {
        hook(&cmd);
    }

    let (ctx, cancel) = ctx.with_value(cmd).with_cancel();
    parts.extensions.insert(ctx);

    let _cancel_on_return = cancel.drop_guard();
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Verify an interaction callback and install it in the request context.
///
/// The installed context is cancelled once the downstream handler returns.
pub async fn verify_interaction_callback(
    State(state): State<VerifyState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let (mut parts, bytes, ctx) = match verified_body(&state, request).await {
        Ok(verified) => verified,
        Err(e) => return state.fail(&path, e),
    };

    let callback = match decode_interaction_callback(&bytes) {
        Ok(callback) => callback,
        Err(e) => return state.fail(&path, e),
    };

    info!(
        path = %path,
        kind = ?callback.kind,
        callback_id = %callback.callback_id,
        "slack_interaction_callback_verified"
    );

    if let Some(hook) = &state.hooks.on_interaction_callback {
        hook(&callback);
    }

    let (ctx, cancel) = ctx.with_value(callback).with_cancel();
    parts.extensions.insert(ctx);

    let _cancel_on_return = cancel.drop_guard();
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Acknowledge with `200 OK` immediately and run the downstream handler in a
/// spawned task.
///
/// The handler sees a value-only copy of the request context, so it is not
/// cut short when the request context is cancelled. Its response is
/// discarded.
pub async fn respond_async(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let ctx = request
        .extensions()
        .get::<Context>()
        .map(Context::values_only)
        .unwrap_or_default();

    let (mut parts, body) = request.into_parts();
    parts.extensions.insert(ctx);
    let request = Request::from_parts(parts, body);

    tokio::spawn(async move {
        let response = next.run(request).await;
        if !response.status().is_success() {
            warn!(path = %path, status = response.status().as_u16(), "async_handler_failed");
        }
    });

    StatusCode::OK.into_response()
}
