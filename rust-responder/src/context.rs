//! Request-scoped contexts.
//!
//! A [`Context`] bundles three things that travel with a request: a typed
//! value bag, an optional deadline and an optional cancellation signal.
//!
//! Detaching work from a request is two separate compositions:
//!
//! ```text
//! Context::values_only(&request_ctx)   // keep values, drop deadline + cancellation
//!     .with_timeout(budget)            // impose a fresh, independent deadline
//! ```

use std::future;
use std::sync::Arc;
use std::time::Duration;

use axum::http::Extensions;
use thiserror::Error;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::payload::{InteractionCallback, SlashCommand};

/// Why a context is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Immutable request-scoped context. Cheap to clone.
///
/// Deriving a child never mutates the parent.
#[derive(Debug, Clone, Default)]
pub struct Context {
    values: Arc<Extensions>,
    deadline: Option<Instant>,
    cancel: Option<CancellationToken>,
}

impl Context {
    /// An empty context that is never done.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a context that carries every value of `parent` but none of its
    /// deadline or cancellation. Its `done` future never resolves.
    ///
    /// Upstream cancellation of any kind, process shutdown included, is not
    /// seen by the derived context.
    pub fn values_only(parent: &Context) -> Self {
        Self {
            values: Arc::clone(&parent.values),
            deadline: None,
            cancel: None,
        }
    }

    /// Derive a child carrying one more value. A value of the same type on
    /// the parent is shadowed.
    pub fn with_value<T>(&self, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut values = Extensions::clone(&self.values);
        values.insert(value);

        Self {
            values: Arc::new(values),
            deadline: self.deadline,
            cancel: self.cancel.clone(),
        }
    }

    /// Derive a child that is done when the returned token is cancelled or
    /// when this context is done.
    pub fn with_cancel(&self) -> (Self, CancellationToken) {
        let token = self.child_token();

        let ctx = Self {
            values: Arc::clone(&self.values),
            deadline: self.deadline,
            cancel: Some(token.clone()),
        };

        (ctx, token)
    }

    /// Derive a child whose deadline is `timeout` from now, or this
    /// context's deadline if that comes sooner.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };

        Self {
            values: Arc::clone(&self.values),
            deadline: Some(deadline),
            cancel: self.cancel.as_ref().map(CancellationToken::child_token),
        }
    }

    fn child_token(&self) -> CancellationToken {
        self.cancel
            .as_ref()
            .map(CancellationToken::child_token)
            .unwrap_or_default()
    }

    /// Look up a value by type.
    pub fn value<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.values.get::<T>()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// `None` while the context is live.
    pub fn err(&self) -> Option<ContextError> {
        if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Some(ContextError::Canceled);
        }

        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    /// Pending forever for contexts with neither.
    pub async fn done(&self) {
        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => future::pending::<()>().await,
            }
        };

        let expired = async {
            match self.deadline {
                Some(deadline) => time::sleep_until(deadline).await,
                None => future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = cancelled => {}
            _ = expired => {}
        }
    }

    /// The verified slash command installed by the verification middleware.
    pub fn slash_command(&self) -> Result<&SlashCommand> {
        self.value::<SlashCommand>()
            .ok_or(Error::PayloadNotFound("slash command"))
    }

    /// The verified interaction callback installed by the verification
    /// middleware.
    pub fn interaction_callback(&self) -> Result<&InteractionCallback> {
        self.value::<InteractionCallback>()
            .ok_or(Error::PayloadNotFound("interaction callback"))
    }
}
