//! Operator notifications for detached responses.
//!
//! The responder reports timeouts, failures and (optionally) successes
//! through a [`Notifier`]. Delivery is best-effort: the responder logs and
//! drops any error a notifier returns.

pub mod slack;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::info;

use crate::error::{Error, Result};

pub use slack::{Message, MessagingClient, SlackClient};

/// Something that happened to a detached response task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The task outlived its budget and was abandoned.
    Timeout {
        endpoint: String,
        budget: Duration,
        timestamp: u64,
    },
    /// The task finished with an error.
    Failure {
        endpoint: String,
        error: String,
        timestamp: u64,
    },
    /// The task finished cleanly.
    Success {
        endpoint: String,
        elapsed: Duration,
        timestamp: u64,
    },
}

impl Notification {
    pub fn timeout(endpoint: impl Into<String>, budget: Duration) -> Self {
        Notification::Timeout {
            endpoint: endpoint.into(),
            budget,
            timestamp: unix_now(),
        }
    }

    pub fn failure(endpoint: impl Into<String>, error: impl Into<String>) -> Self {
        Notification::Failure {
            endpoint: endpoint.into(),
            error: error.into(),
            timestamp: unix_now(),
        }
    }

    pub fn success(endpoint: impl Into<String>, elapsed: Duration) -> Self {
        Notification::Success {
            endpoint: endpoint.into(),
            elapsed,
            timestamp: unix_now(),
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            Notification::Timeout { endpoint, .. }
            | Notification::Failure { endpoint, .. }
            | Notification::Success { endpoint, .. } => endpoint,
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, Notification::Success { .. })
    }

    /// Multi-line, mrkdwn-formatted summary.
    pub fn summary(&self) -> String {
        match self {
            Notification::Timeout {
                endpoint,
                budget,
                timestamp,
            } => format!(
                "response timeout\n*endpoint*: `{}`\n*timeout duration*: `{:?}`\n*timestamp*: `{}`",
                endpoint, budget, timestamp
            ),
            Notification::Failure {
                endpoint,
                timestamp,
                ..
            } => format!(
                "response failure\n*endpoint*: `{}`\n*timestamp*: `{}`",
                endpoint, timestamp
            ),
            Notification::Success {
                endpoint,
                elapsed,
                timestamp,
            } => format!(
                "response complete\n*endpoint*: `{}`\n*elapsed*: `{:?}`\n*timestamp*: `{}`",
                endpoint, elapsed, timestamp
            ),
        }
    }

    /// The underlying error, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Notification::Timeout { .. } => Some("context deadline exceeded"),
            Notification::Failure { error, .. } => Some(error),
            Notification::Success { .. } => None,
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Sink for notifications. Must tolerate concurrent calls.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Channels a [`ChannelNotifier`] posts to. All optional.
#[derive(Debug, Clone, Default)]
pub struct NotifyChannels {
    /// User mentioned on error posts.
    pub admin_id: Option<String>,
    /// Receives success notifications.
    pub log_channel: Option<String>,
    /// Receives timeout and failure notifications.
    pub err_channel: Option<String>,
}

/// Posts notifications to Slack channels through a [`MessagingClient`].
///
/// Errors go to the error channel with the details in a thread reply;
/// successes go to the log channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier<C> {
    client: C,
    channels: NotifyChannels,
}

impl<C: MessagingClient> ChannelNotifier<C> {
    pub fn new(client: C, channels: NotifyChannels) -> Self {
        Self { client, channels }
    }

    /// Post a message to the log channel.
    pub async fn send_to_log_channel(&self, message: &Message) -> Result<()> {
        let channel = configured(&self.channels.log_channel, "log")?;

        self.client
            .post_message(channel, message)
            .await
            .map_err(|e| Error::NotificationDelivery(e.to_string()))?;

        Ok(())
    }

    /// Post `summary: error` to the error channel, with `detail` as a thread
    /// reply.
    pub async fn send_to_err_channel(
        &self,
        summary: &str,
        error: &str,
        detail: &str,
    ) -> Result<()> {
        let channel = configured(&self.channels.err_channel, "error")?;

        let mention = self
            .channels
            .admin_id
            .as_deref()
            .map(|id| format!("<@{}> ", id))
            .unwrap_or_default();

        let body = if summary.is_empty() {
            format!("{}`{}`", mention, error)
        } else {
            format!("{}*{}*: `{}`", mention, summary, error)
        };

        let ts = self
            .client
            .post_message(channel, &Message::text(body))
            .await
            .map_err(|e| Error::NotificationDelivery(e.to_string()))?;

        self.client
            .post_thread_message(channel, &ts, &Message::text(format!("```\n{}\n```", detail)))
            .await
            .map_err(|e| Error::NotificationDelivery(e.to_string()))?;

        Ok(())
    }
}

fn configured<'a>(channel: &'a Option<String>, name: &str) -> Result<&'a str> {
    channel
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| Error::NotificationDelivery(format!("{} channel not configured", name)))
}

#[async_trait]
impl<C: MessagingClient> Notifier for ChannelNotifier<C> {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let summary = notification.summary();

        match notification.detail() {
            Some(error) => {
                self.send_to_err_channel(&summary, error, &format!("{:#?}", notification))
                    .await?
            }
            None => self.send_to_log_channel(&Message::text(summary)).await?,
        }

        info!(
            endpoint = %notification.endpoint(),
            is_error = notification.is_error(),
            "notification_delivered"
        );

        Ok(())
    }
}
