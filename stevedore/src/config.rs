//! Agent configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use stevedore_shared::{AgentError, AgentResult, Transport};

fn default_listen_addr() -> String {
    "127.0.0.1:4444".to_string()
}

fn default_runtime_socket() -> PathBuf {
    PathBuf::from("/var/run/stevedore/runtime.sock")
}

fn default_url_max_age_secs() -> u64 {
    3600
}

fn default_evacuation_bail_out_secs() -> u64 {
    115
}

fn default_health_timeout_secs() -> u64 {
    60
}

/// Top-level agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Address the directory and control HTTP server binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Unix socket of the container runtime daemon.
    #[serde(default = "default_runtime_socket")]
    pub runtime_socket: PathBuf,

    /// TCP port of the runtime daemon; overrides the socket when set.
    #[serde(default)]
    pub runtime_port: Option<u16>,

    /// Maximum age of a signed directory URL, in seconds.
    #[serde(default = "default_url_max_age_secs")]
    pub url_max_age_secs: u64,

    /// Evacuation proceeds to shutdown after this many seconds even if
    /// instances have not finished draining.
    #[serde(default = "default_evacuation_bail_out_secs")]
    pub evacuation_bail_out_secs: u64,

    /// Default deadline for instance health checks, in seconds.
    #[serde(default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            runtime_socket: default_runtime_socket(),
            runtime_port: None,
            url_max_age_secs: default_url_max_age_secs(),
            evacuation_bail_out_secs: default_evacuation_bail_out_secs(),
            health_timeout_secs: default_health_timeout_secs(),
        }
    }
}

impl AgentConfig {
    /// Validate field values after deserialization.
    pub fn sanitize(&self) -> AgentResult<()> {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(AgentError::Config(format!(
                "invalid listen address: {}",
                self.listen_addr
            )));
        }
        if self.url_max_age_secs == 0 {
            return Err(AgentError::Config(
                "url_max_age_secs must be nonzero".to_string(),
            ));
        }
        if self.runtime_port == Some(0) {
            return Err(AgentError::Config("runtime port must be nonzero".to_string()));
        }
        Ok(())
    }

    /// Transport used to reach the runtime daemon.
    pub fn runtime_transport(&self) -> Transport {
        match self.runtime_port {
            Some(port) => Transport::Tcp { port },
            None => Transport::Unix {
                socket_path: self.runtime_socket.clone(),
            },
        }
    }

    pub fn url_max_age(&self) -> Duration {
        Duration::from_secs(self.url_max_age_secs)
    }

    pub fn evacuation_bail_out(&self) -> Duration {
        Duration::from_secs(self.evacuation_bail_out_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_sanitize() {
        let config = AgentConfig::default();
        assert!(config.sanitize().is_ok());
        assert!(matches!(
            config.runtime_transport(),
            Transport::Unix { .. }
        ));
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config: AgentConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.url_max_age_secs, 3600);
        assert_eq!(config.evacuation_bail_out_secs, 115);
    }

    #[test]
    fn rejects_bad_values() {
        let config = AgentConfig {
            listen_addr: "not-an-addr".to_string(),
            ..AgentConfig::default()
        };
        assert!(config.sanitize().is_err());

        let config = AgentConfig {
            url_max_age_secs: 0,
            ..AgentConfig::default()
        };
        assert!(config.sanitize().is_err());

        let config = AgentConfig {
            runtime_port: Some(0),
            ..AgentConfig::default()
        };
        assert!(config.sanitize().is_err());
    }

    #[test]
    fn port_overrides_socket() {
        let config = AgentConfig {
            runtime_port: Some(7777),
            ..AgentConfig::default()
        };
        assert!(matches!(
            config.runtime_transport(),
            Transport::Tcp { port: 7777 }
        ));
    }
}
