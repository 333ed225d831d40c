//! Configuration module for environment variable parsing.
//!
//! Every setting has a default; unparsable values are logged and replaced by
//! the default.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use tracing::warn;

use crate::notify::slack::SLACK_API_BASE;
use crate::notify::NotifyChannels;
use crate::respond::TimeoutConfig;
use crate::web::signature::DEFAULT_MAX_AGE_SECONDS;

/// Env prefix for slash command response settings.
pub const SLASH_PREFIX: &str = "SLASH";

/// Env prefix for interaction callback response settings.
pub const CALLBACK_PREFIX: &str = "CALLBACK";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Slack app signing secret used to verify inbound requests
    pub signing_secret: Option<String>,

    /// Maximum age in seconds for Slack request timestamps
    pub signature_max_age: u64,

    /// Bot token for Slack Web API calls
    pub bot_token: Option<String>,

    /// Slack Web API root
    pub api_url: String,

    /// User mentioned on error notifications
    pub admin_id: Option<String>,

    /// Channel receiving success notifications
    pub log_channel: Option<String>,

    /// Channel receiving timeout and failure notifications
    pub err_channel: Option<String>,

    /// Response budgets for slash commands
    pub slash: TimeoutConfig,

    /// Response budgets for interaction callbacks
    pub callback: TimeoutConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),

            signing_secret: parse_optional("SLACK_SIGNING_SECRET"),

            signature_max_age: env::var("SLACK_SIGNATURE_MAX_AGE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_AGE_SECONDS),

            bot_token: parse_optional("SLACK_BOT_TOKEN"),

            api_url: env::var("SLACK_API_URL").unwrap_or_else(|_| SLACK_API_BASE.to_string()),

            admin_id: parse_optional("SLACK_ADMIN_ID"),

            log_channel: parse_optional("SLACK_LOG_CHANNEL"),

            err_channel: parse_optional("SLACK_ERR_CHANNEL"),

            slash: timeout_config(SLASH_PREFIX),

            callback: timeout_config(CALLBACK_PREFIX),
        }
    }

    pub fn notify_channels(&self) -> NotifyChannels {
        NotifyChannels {
            admin_id: self.admin_id.clone(),
            log_channel: self.log_channel.clone(),
            err_channel: self.err_channel.clone(),
        }
    }
}

/// Read the response settings for one payload kind.
fn timeout_config(prefix: &str) -> TimeoutConfig {
    let global_name = format!("{}_RESPONSE_TIMEOUT_MS", prefix);
    let global_ms = match env::var(&global_name) {
        Ok(raw) => raw.trim().parse::<u64>().unwrap_or_else(|_| {
            warn!(env_var = %global_name, value = %raw, "Invalid timeout, using default");
            0
        }),
        Err(_) => 0,
    };

    TimeoutConfig {
        global: Duration::from_millis(global_ms),
        overrides: parse_timeout_map(&format!("{}_RESPONSE_TIMEOUT_MAP", prefix)),
        warn_deadline_exceeded: parse_bool(&format!("{}_WARN_DEADLINE_EXCEEDED", prefix), false),
        log_success: parse_bool(&format!("{}_LOG_SUCCESS", prefix), false),
    }
}

/// Parse per-endpoint budgets like "/deploy=30000,/status=500".
///
/// Malformed entries are skipped with a warning.
fn parse_timeout_map(name: &str) -> HashMap<String, Duration> {
    let mut overrides = HashMap::new();

    let Ok(raw) = env::var(name) else {
        return overrides;
    };

    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let parsed = entry
            .split_once('=')
            .map(|(path, ms)| (path.trim(), ms.trim().parse::<u64>()));

        match parsed {
            Some((path, Ok(ms))) if !path.is_empty() => {
                overrides.insert(path.to_string(), Duration::from_millis(ms));
            }
            _ => {
                warn!(env_var = name, entry = %entry, "Invalid timeout override, skipping");
            }
        }
    }

    overrides
}

/// Parse a boolean flag. Accepts true/false, 1/0, yes/no.
fn parse_bool(name: &str, default: bool) -> bool {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => true,
        "false" | "0" | "no" => false,
        _ => {
            warn!(env_var = name, value = %raw, "Invalid boolean, using default");
            default
        }
    }
}

/// Read a variable, treating empty values as unset.
fn parse_optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timeout_map_valid() {
        env::set_var("TEST_TIMEOUT_MAP", "/deploy=30000, /status=500");
        let result = parse_timeout_map("TEST_TIMEOUT_MAP");
        assert_eq!(result.len(), 2);
        assert_eq!(result["/deploy"], Duration::from_millis(30000));
        assert_eq!(result["/status"], Duration::from_millis(500));
        env::remove_var("TEST_TIMEOUT_MAP");
    }

    #[test]
    fn test_parse_timeout_map_skips_bad_entries() {
        env::set_var("TEST_TIMEOUT_MAP_BAD", "/ok=5,/nope,=10,/slow=abc");
        let result = parse_timeout_map("TEST_TIMEOUT_MAP_BAD");
        assert_eq!(result.len(), 1);
        assert_eq!(result["/ok"], Duration::from_millis(5));
        env::remove_var("TEST_TIMEOUT_MAP_BAD");
    }

    #[test]
    fn test_parse_timeout_map_default() {
        assert!(parse_timeout_map("NONEXISTENT_TIMEOUT_MAP").is_empty());
    }

    #[test]
    fn test_parse_bool() {
        env::set_var("TEST_BOOL_TRUE", "TRUE");
        env::set_var("TEST_BOOL_ZERO", "0");
        env::set_var("TEST_BOOL_JUNK", "maybe");
        assert!(parse_bool("TEST_BOOL_TRUE", false));
        assert!(!parse_bool("TEST_BOOL_ZERO", true));
        assert!(parse_bool("TEST_BOOL_JUNK", true));
        assert!(!parse_bool("NONEXISTENT_BOOL", false));
        env::remove_var("TEST_BOOL_TRUE");
        env::remove_var("TEST_BOOL_ZERO");
        env::remove_var("TEST_BOOL_JUNK");
    }

    #[test]
    fn test_timeout_config_from_prefix() {
        env::set_var("TESTKIND_RESPONSE_TIMEOUT_MS", "2500");
        env::set_var("TESTKIND_RESPONSE_TIMEOUT_MAP", "/slow=60000");
        env::set_var("TESTKIND_WARN_DEADLINE_EXCEEDED", "true");

        let cfg = timeout_config("TESTKIND");
        assert_eq!(cfg.resolve("/fast"), Duration::from_millis(2500));
        assert_eq!(cfg.resolve("/slow"), Duration::from_secs(60));
        assert!(cfg.warn_deadline_exceeded);
        assert!(!cfg.log_success);

        env::remove_var("TESTKIND_RESPONSE_TIMEOUT_MS");
        env::remove_var("TESTKIND_RESPONSE_TIMEOUT_MAP");
        env::remove_var("TESTKIND_WARN_DEADLINE_EXCEEDED");
    }

    #[test]
    fn test_timeout_config_defaults() {
        let cfg = timeout_config("UNSETKIND");
        assert!(cfg.global.is_zero());
        assert!(cfg.overrides.is_empty());
        assert!(!cfg.warn_deadline_exceeded);
    }

    #[test]
    fn test_parse_optional_treats_empty_as_unset() {
        env::set_var("TEST_OPTIONAL_EMPTY", "  ");
        assert_eq!(parse_optional("TEST_OPTIONAL_EMPTY"), None);
        env::remove_var("TEST_OPTIONAL_EMPTY");
    }
}
