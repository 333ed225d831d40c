//! Execution budgets for detached responses.

use std::collections::HashMap;
use std::time::Duration;

/// Budget used when neither an override nor a global timeout is configured.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Budget configuration for one payload kind. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Global budget. Zero means unset.
    pub global: Duration,
    /// Per-endpoint budgets, keyed by exact request path.
    pub overrides: HashMap<String, Duration>,
    /// Emit a notification when a task outlives its budget.
    pub warn_deadline_exceeded: bool,
    /// Emit a notification when a task completes successfully.
    pub log_success: bool,
}

impl TimeoutConfig {
    pub fn new(global: Duration) -> Self {
        Self {
            global,
            ..Default::default()
        }
    }

    pub fn with_override(mut self, endpoint: impl Into<String>, timeout: Duration) -> Self {
        self.overrides.insert(endpoint.into(), timeout);
        self
    }

    pub fn warn_deadline_exceeded(mut self, warn: bool) -> Self {
        self.warn_deadline_exceeded = warn;
        self
    }

    pub fn log_success(mut self, log: bool) -> Self {
        self.log_success = log;
        self
    }

    /// Resolve the budget for an endpoint: exact override, then the global
    /// budget if non-zero, then [`DEFAULT_RESPONSE_TIMEOUT`].
    pub fn resolve(&self, endpoint: &str) -> Duration {
        if let Some(timeout) = self.overrides.get(endpoint) {
            return *timeout;
        }

        if self.global.is_zero() {
            return DEFAULT_RESPONSE_TIMEOUT;
        }

        self.global
    }
}
