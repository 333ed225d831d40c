//! slackack - Signed Slack webhooks with deadline-detached responses.
//!
//! This library verifies inbound Slack requests, decodes slash commands and
//! interaction callbacks, and runs the real response work outside Slack's
//! three second acknowledgement window.
//!
//! ## Architecture
//!
//! ```text
//! Slack → verify middleware → handler ──200 OK──► Slack
//!                                │
//!                                └─ Responder ─► detached task ─► Slack Web API
//!                                        │
//!                                        └─ timeout/failure ─► Notifier
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod notify;
pub mod payload;
pub mod respond;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use context::{Context, ContextError};
pub use error::{Error, Result};
pub use notify::{ChannelNotifier, Notification, Notifier, NotifyChannels, SlackClient};
pub use payload::{
    decode_interaction_callback, decode_slash_command, InteractionCallback, SlashCommand,
};
pub use respond::{Responder, ResponderConfig, TimeoutConfig};
pub use web::{AppState, SignatureVerifier, SigningSecret};
