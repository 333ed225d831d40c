//! Slack request signature verification.
//!
//! Slack signs every request with HMAC-SHA256 over `v0:{timestamp}:{body}`
//! using the app's signing secret.
//! Reference: https://api.slack.com/authentication/verifying-requests-from-slack

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::{HeaderMap, Method};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `v0=<hex digest>`.
pub const SIGNATURE_HEADER: &str = "X-Slack-Signature";

/// Header carrying the Unix timestamp the request was signed at.
pub const TIMESTAMP_HEADER: &str = "X-Slack-Request-Timestamp";

/// Signature scheme version, used both in the base string and the header.
pub const SIGNATURE_VERSION: &str = "v0";

/// Default freshness window in seconds.
pub const DEFAULT_MAX_AGE_SECONDS: u64 = 300;

/// Shared signing secret. Its contents never appear in `Debug` output.
#[derive(Clone)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(secret.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

/// Compute the `v0=<hex>` signature Slack would send for this request.
pub fn compute_signature(secret: &SigningSecret, timestamp: &str, body: &[u8]) -> String {
    format!("{}={}", SIGNATURE_VERSION, hex_digest(secret, timestamp, body))
}

fn hex_digest(secret: &SigningSecret, timestamp: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(SIGNATURE_VERSION.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies inbound requests against a signing secret.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    secret: SigningSecret,
    max_age_seconds: u64,
}

impl SignatureVerifier {
    pub fn new(secret: SigningSecret) -> Self {
        Self {
            secret,
            max_age_seconds: DEFAULT_MAX_AGE_SECONDS,
        }
    }

    /// Override the freshness window.
    pub fn with_max_age(mut self, max_age_seconds: u64) -> Self {
        self.max_age_seconds = max_age_seconds;
        self
    }

    pub fn max_age_seconds(&self) -> u64 {
        self.max_age_seconds
    }

    /// Verify a captured request: method, headers, then signature.
    ///
    /// Non-POST requests are rejected before any HMAC is computed.
    pub fn verify_request(&self, method: &Method, headers: &HeaderMap, body: &[u8]) -> Result<()> {
        check_method(method)?;

        let timestamp = header_str(headers, TIMESTAMP_HEADER)?;
        let signature = header_str(headers, SIGNATURE_HEADER)?;

        self.verify(timestamp, signature, body)
    }

    /// Verify a signature against the current wall clock.
    pub fn verify(&self, timestamp: &str, signature: &str, body: &[u8]) -> Result<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;

        self.verify_at(timestamp, signature, body, now)
    }

    /// Verify a signature as if the current time were `now` (Unix seconds).
    ///
    /// Checks run in order: header shape, freshness, HMAC. A stale timestamp
    /// fails before the HMAC is computed, so it never reveals mismatch detail.
    pub fn verify_at(&self, timestamp: &str, signature: &str, body: &[u8], now: i64) -> Result<()> {
        if timestamp.is_empty() || signature.is_empty() {
            warn!(
                has_timestamp = !timestamp.is_empty(),
                has_signature = !signature.is_empty(),
                "slack_signature_missing_headers"
            );
            return Err(Error::MalformedHeader("missing headers".to_string()));
        }

        let request_time: i64 = timestamp.trim().parse().map_err(|_| {
            warn!(timestamp = %timestamp, "slack_signature_invalid_timestamp");
            Error::MalformedHeader(format!("invalid {} header", TIMESTAMP_HEADER))
        })?;

        let provided = signature
            .strip_prefix(SIGNATURE_VERSION)
            .and_then(|rest| rest.strip_prefix('='))
            .ok_or_else(|| {
                warn!(signature_length = signature.len(), "slack_signature_unknown_version");
                Error::MalformedHeader(format!(
                    "{} header must start with {}=",
                    SIGNATURE_HEADER, SIGNATURE_VERSION
                ))
            })?;

        let age = now.abs_diff(request_time);
        if age > self.max_age_seconds {
            warn!(
                request_time = request_time,
                current_time = now,
                age_seconds = age,
                max_age_seconds = self.max_age_seconds,
                "slack_signature_stale"
            );
            return Err(Error::Replay {
                timestamp: request_time,
                age_seconds: age,
            });
        }

        let computed = hex_digest(&self.secret, timestamp, body);

        if !constant_time_compare(&computed, provided) {
            warn!(
                expected_length = provided.len(),
                computed_length = computed.len(),
                "slack_signature_mismatch"
            );
            return Err(Error::SignatureMismatch {
                expected: provided.to_string(),
                computed,
            });
        }

        Ok(())
    }
}

/// Only POST requests are eligible for verification.
pub fn check_method(method: &Method) -> Result<()> {
    if method != Method::POST {
        warn!(method = %method, "slack_signature_method_rejected");
        return Err(Error::MethodNotAllowed(method.to_string()));
    }

    Ok(())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str> {
    let value = headers
        .get(name)
        .ok_or_else(|| Error::MalformedHeader(format!("missing {} header", name)))?;

    value
        .to_str()
        .map_err(|_| Error::MalformedHeader(format!("{} header is not visible ASCII", name)))
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
