//! Messaging client capability and its Slack Web API implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Base URL for the Slack Web API.
pub const SLACK_API_BASE: &str = "https://slack.com/api";

/// An outgoing message: plain text with optional Block Kit blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Message {
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<serde_json::Value>,
}

impl Message {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            blocks: Vec::new(),
        }
    }
}

/// Capability for posting messages to conversations.
///
/// Implementations must be safe to call from many tasks at once; every call
/// is an independent network operation.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Post a message, returning its timestamp.
    async fn post_message(&self, channel: &str, message: &Message) -> Result<String>;

    /// Reply in the thread rooted at `thread_ts`.
    async fn post_thread_message(
        &self,
        channel: &str,
        thread_ts: &str,
        message: &Message,
    ) -> Result<()>;

    /// Post a message only `user` can see, returning its timestamp.
    async fn post_ephemeral(&self, channel: &str, user: &str, message: &Message) -> Result<String>;
}

/// Generic Slack API response envelope.
#[derive(Debug, Deserialize)]
struct SlackApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    message_ts: Option<String>,
}

/// Thin async client for the Slack Web API methods this crate needs.
#[derive(Debug, Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    bot_token: String,
    base_url: String,
}

impl SlackClient {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            bot_token: bot_token.into(),
            base_url: SLACK_API_BASE.to_string(),
        }
    }

    /// Point the client at a different API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn call(&self, method: &str, body: &serde_json::Value) -> Result<SlackApiResponse> {
        let url = format!("{}/{}", self.base_url, method);

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.bot_token)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!(method = method, error = %e, "slack_api_request_failed");
                Error::SlackApi(format!("{}: {}", method, e))
            })?;

        let status = resp.status();
        let parsed: SlackApiResponse = resp.json().await.map_err(|e| {
            warn!(
                method = method,
                status = status.as_u16(),
                error = %e,
                "slack_api_response_invalid"
            );
            Error::SlackApi(format!("{}: invalid response ({}): {}", method, status, e))
        })?;

        if !parsed.ok {
            let error = parsed.error.unwrap_or_else(|| "unknown_error".to_string());
            warn!(method = method, error = %error, "slack_api_error");
            return Err(Error::SlackApi(format!("{}: {}", method, error)));
        }

        Ok(parsed)
    }
}

fn message_body(channel: &str, message: &Message) -> serde_json::Value {
    let mut body = json!({
        "channel": channel,
        "text": message.text,
    });
    if !message.blocks.is_empty() {
        body["blocks"] = json!(message.blocks);
    }
    body
}

#[async_trait]
impl MessagingClient for SlackClient {
    async fn post_message(&self, channel: &str, message: &Message) -> Result<String> {
        debug!(channel = channel, "slack_post_message");
        let resp = self.call("chat.postMessage", &message_body(channel, message)).await?;

        resp.ts
            .ok_or_else(|| Error::SlackApi("chat.postMessage: response missing ts".to_string()))
    }

    async fn post_thread_message(
        &self,
        channel: &str,
        thread_ts: &str,
        message: &Message,
    ) -> Result<()> {
        debug!(channel = channel, thread_ts = thread_ts, "slack_post_thread_message");
        let mut body = message_body(channel, message);
        body["thread_ts"] = json!(thread_ts);

        self.call("chat.postMessage", &body).await?;
        Ok(())
    }

    async fn post_ephemeral(&self, channel: &str, user: &str, message: &Message) -> Result<String> {
        debug!(channel = channel, user = user, "slack_post_ephemeral");
        let mut body = message_body(channel, message);
        body["user"] = json!(user);

        let resp = self.call("chat.postEphemeral", &body).await?;
        Ok(resp.message_ts.unwrap_or_default())
    }
}
