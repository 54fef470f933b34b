//! Agent configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::{duration_secs, option_duration_secs};
use crate::error::ConfigError;

/// Configuration for the cluster agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Control server address (`host[:port]`, no scheme)
    pub server_url: String,

    /// Shared secret sent in the `token` header and used to fetch the agent manifest
    pub token: String,

    /// Path to a kubeconfig file; absent means in-cluster (inferred) config
    pub kubeconfig: Option<PathBuf>,

    /// Use `wss`/`https` instead of `ws`/`http`
    pub tls: bool,

    /// Fixed delay between reconnection attempts
    #[serde(with = "duration_secs")]
    pub retry_interval: Duration,

    /// Timeout for dialing any server connection
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Capacity of the queue feeding the one-shot response writer
    pub response_queue_capacity: usize,

    /// Capacity of the exec frame queue and of each session's queue
    pub exec_queue_capacity: usize,

    /// Maximum number of one-shot response connections open at once
    pub max_inflight_responses: usize,

    /// Stop exec sessions that saw no frame for this long (disabled when absent)
    #[serde(with = "option_duration_secs")]
    pub session_idle_timeout: Option<Duration>,

    /// Field manager name used for server-side operations
    pub field_manager: String,

    /// Relay cluster object changes to the server
    pub watch: bool,

    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: "kubespace".to_string(),
            token: "local".to_string(),
            kubeconfig: None,
            tls: false,
            retry_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(30),
            response_queue_capacity: 1000,
            exec_queue_capacity: 1000,
            max_inflight_responses: 1000,
            session_idle_timeout: None,
            field_manager: "ks-agent".to_string(),
            watch: true,
            log_level: "info".to_string(),
        }
    }
}

impl AgentConfig {
    /// Check that the fields the agent cannot run without are present
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_url.trim().is_empty() {
            return Err(ConfigError::MissingField("server_url".to_string()));
        }
        if self.token.trim().is_empty() {
            return Err(ConfigError::MissingField("token".to_string()));
        }
        if self.response_queue_capacity == 0
            || self.exec_queue_capacity == 0
            || self.max_inflight_responses == 0
        {
            return Err(ConfigError::Invalid(
                "queue capacities must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_source_behavior() {
        let config = AgentConfig::default();
        assert_eq!(config.retry_interval, Duration::from_secs(5));
        assert_eq!(config.exec_queue_capacity, 1000);
        assert!(config.session_idle_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_token() {
        let config = AgentConfig {
            token: "  ".to_string(),
            ..AgentConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField(field)) if field == "token"
        ));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = AgentConfig {
            max_inflight_responses: 0,
            ..AgentConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
