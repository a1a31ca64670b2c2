//! Bridge configuration.
//!
//! In a host editor these values come from the plugin's settings page; the
//! bridge reads them as a JSON object. Every field is optional and falls
//! back to its default.
//!
//! ```rust
//! use databridge::BridgeConfig;
//!
//! let config = BridgeConfig::from_json_str(r#"{"listen_addr": "127.0.0.1:0", "max_sessions": 4}"#)?;
//! assert_eq!(config.max_sessions, 4);
//! assert_eq!(config.max_in_flight, 64);
//! # Ok::<(), databridge::ConfigError>(())
//! ```

use std::time::Duration;

use databridge_protocol::{Framing, DEFAULT_MAX_FRAME_LEN};
use databridge_session::SessionConfig;
use serde::Deserialize;

/// Default TCP port of the editor plugin.
pub const DEFAULT_PORT: u16 = 8742;

/// Errors from loading or validating a [`BridgeConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The settings document is not valid JSON or has a wrong field type.
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field holds a value the bridge cannot run with.
    #[error("invalid value for '{field}': {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// Settings for one bridge server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Address the TCP listener binds to.
    pub listen_addr: String,
    /// How frames are delimited on the stream.
    pub framing: Framing,
    /// Largest accepted frame body, in bytes.
    pub max_frame_bytes: usize,
    /// Client-visible bound on one request.
    pub request_timeout_ms: u64,
    /// Concurrent sessions; further connections are refused.
    pub max_sessions: usize,
    /// Requests one session may have awaiting a response.
    pub max_in_flight: usize,
    /// Messages that may wait in one session's outbound queue.
    pub max_queued_messages: usize,
    /// How long a full outbound queue may block the session before it is
    /// closed as unresponsive.
    pub send_timeout_ms: u64,
    /// How long a draining session waits for in-flight handlers.
    pub drain_grace_ms: u64,
    /// How long the server waits for sessions to drain on stop.
    pub shutdown_grace_ms: u64,
    /// Jobs that may queue for the engine context.
    pub engine_queue_capacity: usize,
    /// Log every command and its result.
    pub log_commands: bool,
    /// Commands slower than this log a warning.
    pub slow_command_warn_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen_addr: format!("127.0.0.1:{DEFAULT_PORT}"),
            framing: Framing::LengthPrefixed,
            max_frame_bytes: DEFAULT_MAX_FRAME_LEN,
            request_timeout_ms: 30_000,
            max_sessions: 16,
            max_in_flight: 64,
            max_queued_messages: 256,
            send_timeout_ms: 10_000,
            drain_grace_ms: 2_000,
            shutdown_grace_ms: 5_000,
            engine_queue_capacity: 256,
            log_commands: false,
            slow_command_warn_ms: 30_000,
        }
    }
}

impl BridgeConfig {
    /// Parses and validates a JSON settings object.
    ///
    /// # Errors
    /// [`ConfigError::Parse`] for malformed JSON or unknown fields,
    /// [`ConfigError::Invalid`] if a value fails [`validate`](Self::validate).
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every limit is usable.
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_addr.trim().is_empty() {
            return Err(invalid("listen_addr", "must not be empty"));
        }
        let positive = [
            ("max_frame_bytes", self.max_frame_bytes as u64),
            ("request_timeout_ms", self.request_timeout_ms),
            ("max_sessions", self.max_sessions as u64),
            ("max_in_flight", self.max_in_flight as u64),
            ("max_queued_messages", self.max_queued_messages as u64),
            ("send_timeout_ms", self.send_timeout_ms),
            ("engine_queue_capacity", self.engine_queue_capacity as u64),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(invalid(field, "must be greater than zero"));
            }
        }
        if self.max_frame_bytes > u32::MAX as usize {
            return Err(invalid("max_frame_bytes", "must fit in 32 bits"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn slow_command_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_command_warn_ms)
    }

    /// The per-session limits.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            max_in_flight: self.max_in_flight,
            drain_grace: Duration::from_millis(self.drain_grace_ms),
        }
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid_loopback() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen_addr, "127.0.0.1:8742");
        assert_eq!(config.framing, Framing::LengthPrefixed);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_from_json_str_fills_missing_fields() {
        let config = BridgeConfig::from_json_str(
            r#"{"framing": "line_delimited", "log_commands": true}"#,
        )
        .unwrap();
        assert_eq!(config.framing, Framing::LineDelimited);
        assert!(config.log_commands);
        assert_eq!(config.max_sessions, 16);
    }

    #[test]
    fn test_from_json_str_empty_object_is_default() {
        let config = BridgeConfig::from_json_str("{}").unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_from_json_str_malformed_is_parse_error() {
        let err = BridgeConfig::from_json_str("{listen_addr").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_json_str_unknown_field_is_parse_error() {
        let err = BridgeConfig::from_json_str(r#"{"port": 1}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validate_zero_timeout_is_invalid() {
        let err = BridgeConfig::from_json_str(r#"{"request_timeout_ms": 0}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "request_timeout_ms",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_zero_sessions_is_invalid() {
        let config = BridgeConfig {
            max_sessions: 0,
            ..BridgeConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_sessions"));
    }

    #[test]
    fn test_validate_zero_queue_is_invalid() {
        let err = BridgeConfig::from_json_str(r#"{"max_queued_messages": 0}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "max_queued_messages",
                ..
            }
        ));
    }

    #[test]
    fn test_session_config_carries_limits() {
        let config = BridgeConfig {
            max_in_flight: 3,
            drain_grace_ms: 250,
            ..BridgeConfig::default()
        };
        let session = config.session_config();
        assert_eq!(session.max_in_flight, 3);
        assert_eq!(session.drain_grace, Duration::from_millis(250));
    }
}
