//! Manager configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use ami_protocol::DEFAULT_AMI_PORT;

/// Connection parameters for the manager interface.
///
/// The surrounding service decides where these come from (environment,
/// config file); the core treats them as opaque values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Manager interface host
    pub host: String,
    /// Manager interface TCP port
    pub port: u16,
    /// Login username
    pub username: String,
    /// Login secret
    pub secret: String,
    /// Fixed delay between reconnect attempts
    pub reconnect_delay: Duration,
    /// Deadline for each submitted action
    pub action_timeout: Duration,
}

impl ManagerConfig {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_AMI_PORT,
            username: username.into(),
            secret: secret.into(),
            reconnect_delay: Duration::from_secs(5),
            action_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    /// `host:port` form for the TCP connector
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
