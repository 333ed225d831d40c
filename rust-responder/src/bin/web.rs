//! slackack Web Server - Slack webhook receiver.
//!
//! This binary provides a thin web server that:
//! - Verifies Slack request signatures
//! - Acknowledges slash commands and interactions immediately
//! - Runs the real response as a detached, budget-bounded task
//! - Reports timeouts and failures to the configured Slack channels

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use slackack::notify::{ChannelNotifier, MessagingClient, Notifier, SlackClient};
use slackack::web::middleware::FailureHook;
use slackack::web::{router, AppState, VerifyHooks, VerifyState};
use slackack::{Config, Responder, ResponderConfig, SignatureVerifier, SigningSecret};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        signature_max_age = config.signature_max_age,
        bot_token_configured = config.bot_token.is_some(),
        err_channel_configured = config.err_channel.is_some(),
        log_channel_configured = config.log_channel.is_some(),
        slash_timeout_ms = config.slash.global.as_millis() as u64,
        slash_overrides = config.slash.overrides.len(),
        callback_timeout_ms = config.callback.global.as_millis() as u64,
        callback_overrides = config.callback.overrides.len(),
        "config_loaded"
    );

    let secret = config
        .signing_secret
        .clone()
        .context("SLACK_SIGNING_SECRET must be set")?;
    let verifier =
        SignatureVerifier::new(SigningSecret::new(secret)).with_max_age(config.signature_max_age);

    let on_failure: FailureHook = Arc::new(|path: &str, err: &slackack::Error| {
        warn!(path = %path, error = %err, "slack_request_rejected");
    });
    let hooks = VerifyHooks {
        on_failure: Some(on_failure),
        ..Default::default()
    };

    // Slack Web API client, shared by handlers and the notifier
    let slack = config.bot_token.as_ref().map(|token| {
        SlackClient::new(token.clone()).with_base_url(config.api_url.clone())
    });
    if slack.is_none() {
        warn!("slack_bot_token_not_configured");
    }

    let notifier = slack.clone().map(|client| {
        Arc::new(ChannelNotifier::new(client, config.notify_channels())) as Arc<dyn Notifier>
    });

    let responder = Responder::new(ResponderConfig {
        slash: config.slash.clone(),
        callback: config.callback.clone(),
        notifier,
    });

    // Create application state
    let slack = slack.map(|client| Arc::new(client) as Arc<dyn MessagingClient>);
    let state = AppState::new(
        responder,
        VerifyState::new(verifier).with_hooks(hooks),
        slack,
    );

    // Build the router
    let app = router(state).layer(TraceLayer::new_for_http());

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown. Detached responses still in
    // flight are dropped with the runtime.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
