//! Error types shared by verification, decoding and notification.

use thiserror::Error;

/// Errors surfaced by the webhook pipeline.
///
/// Verification and decoding errors are returned synchronously to the HTTP
/// layer. Errors raised inside a detached response task never reach the
/// caller; they only show up as notifications.
#[derive(Debug, Error)]
pub enum Error {
    /// The request used a method other than POST.
    #[error("method {0} not allowed, webhooks must be POST")]
    MethodNotAllowed(String),

    /// A signature or timestamp header is missing or unparsable.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The request timestamp is outside the freshness window.
    #[error("timestamp is too old")]
    Replay { timestamp: i64, age_seconds: u64 },

    /// The HMAC carried by the request does not match the computed one.
    #[error("Expected signing signature: {expected}, but computed: {computed}")]
    SignatureMismatch { expected: String, computed: String },

    /// The body could not be decoded as a form or as the embedded JSON.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A handler asked for a verified payload that was never installed.
    #[error("no {0} found in context")]
    PayloadNotFound(&'static str),

    /// A Slack Web API call failed or returned `ok: false`.
    #[error("Slack API error: {0}")]
    SlackApi(String),

    /// A notification could not be delivered.
    #[error("notification delivery failed: {0}")]
    NotificationDelivery(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error comes from request authentication rather than
    /// payload content.
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            Error::MalformedHeader(_) | Error::Replay { .. } | Error::SignatureMismatch { .. }
        )
    }
}
