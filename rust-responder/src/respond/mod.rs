//! Detached response execution.

pub mod responder;
pub mod timeout;

pub use responder::{Responder, ResponderConfig, ResponseHandle, TaskOutcome};
pub use timeout::{TimeoutConfig, DEFAULT_RESPONSE_TIMEOUT};
