use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::{Result, ServerError};
use crate::replication::DEFAULT_BROADCAST_CAPACITY;
use crate::storage::StorageConfig;

/// Main server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: NetworkConfig,
    pub storage: StorageConfig,
    pub replication: ReplicationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on concurrently served connections
    pub max_connections: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6389,
            max_connections: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Mutation queue capacity; writers block once it is full
    pub broadcast_capacity: usize,
    /// Primary to replicate from at startup (`host:port`)
    pub replicaof: Option<String>,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            replicaof: None,
        }
    }
}

impl ReplicationConfig {
    /// Split `replicaof` into host and port
    pub fn primary(&self) -> Option<Result<(String, u16)>> {
        self.replicaof.as_deref().map(parse_host_port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `json` or `text`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(ServerError::Config("server.port must be non-zero".into()));
        }
        if self.server.max_connections == 0 {
            return Err(ServerError::Config(
                "server.max_connections must be non-zero".into(),
            ));
        }
        if self.replication.broadcast_capacity == 0 {
            return Err(ServerError::Config(
                "replication.broadcast_capacity must be non-zero".into(),
            ));
        }
        if let Some(primary) = self.replication.primary() {
            primary?;
        }
        match self.logging.format.as_str() {
            "json" | "text" => {}
            other => {
                return Err(ServerError::Config(format!(
                    "unknown logging.format '{}' (expected json or text)",
                    other
                )));
            }
        }
        Ok(())
    }

    /// Get server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Configured data directory, or `db-<port>`
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("db-{}", self.server.port)))
    }
}

/// Parse `host:port`
pub fn parse_host_port(addr: &str) -> Result<(String, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| ServerError::Config(format!("'{}' is not host:port", addr)))?;
    if host.is_empty() {
        return Err(ServerError::Config(format!("'{}' has no host", addr)));
    }
    let port = port
        .parse::<u16>()
        .map_err(|_| ServerError::Config(format!("'{}' has an invalid port", addr)))?;
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_port() {
        assert_eq!(
            parse_host_port("10.0.0.1:6389").unwrap(),
            ("10.0.0.1".to_string(), 6389)
        );
        assert!(parse_host_port("localhost").is_err());
        assert!(parse_host_port(":6389").is_err());
        assert!(parse_host_port("localhost:http").is_err());
    }

    #[test]
    fn test_data_dir_follows_port() {
        let mut config = ServerConfig::default();
        config.server.port = 7000;
        assert_eq!(config.data_dir(), PathBuf::from("db-7000"));

        config.storage.data_dir = Some(PathBuf::from("/var/lib/replikv"));
        assert_eq!(config.data_dir(), PathBuf::from("/var/lib/replikv"));
    }
}
