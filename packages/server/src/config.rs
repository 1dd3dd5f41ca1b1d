//! Management endpoint configuration.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use thiserror::Error;

use crate::connection::DEFAULT_MAX_MESSAGE_SIZE;

/// Management endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1)
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// TCP port to listen on; the listener refuses to start without one.
    /// Port 0 asks the OS for an ephemeral port.
    #[serde(default)]
    pub port: Option<u16>,

    /// Maximum number of simultaneously connected clients
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum size of one framed message (bytes)
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_max_connections() -> usize {
    64
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: None,
            max_connections: default_max_connections(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl ServerConfig {
    /// Configuration listening on `port` with every other field defaulted.
    pub fn with_port(port: u16) -> Self {
        Self {
            port: Some(port),
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Socket address to bind, if a port is configured.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.port.map(|port| SocketAddr::new(self.bind_address, port))
    }

    /// Validate configuration.
    ///
    /// A missing port is not checked here; it is reported when the listener
    /// starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "max_connections cannot be 0".into(),
            ));
        }
        if self.max_message_size < 16 {
            return Err(ConfigError::InvalidValue(format!(
                "max_message_size too small: {}",
                self.max_message_size
            )));
        }
        if self.max_message_size > u32::MAX as usize {
            return Err(ConfigError::InvalidValue(format!(
                "max_message_size exceeds frame limit: {}",
                self.max_message_size
            )));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
