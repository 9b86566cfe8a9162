use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AgentError, Result};
use crate::resource::{ComputeResource, Location};

/// TLS configuration for the agent listener and its clients.
///
/// When a CA certificate is configured the listener requires clients to
/// present a certificate signed by it (mutual TLS).
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Enable TLS. If false, all other TLS settings are ignored.
    pub enabled: bool,

    /// Path to the CA certificate (PEM format).
    /// Used to verify peer certificates.
    pub ca_cert_path: Option<PathBuf>,

    /// Path to this node's certificate (PEM format).
    pub cert_path: Option<PathBuf>,

    /// Path to this node's private key (PEM format).
    /// Must match the certificate.
    pub key_path: Option<PathBuf>,

    /// When true and TLS files are missing, the agent runs in plaintext mode
    /// with a warning instead of refusing to start.
    pub allow_insecure: bool,
}

impl TlsConfig {
    /// Check if TLS is properly configured with all required files.
    pub fn is_complete(&self) -> bool {
        self.enabled
            && self.ca_cert_path.is_some()
            && self.cert_path.is_some()
            && self.key_path.is_some()
    }
}

/// Everything an agent needs to start serving.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// `host:port` of the cluster master receiving heartbeats.
    pub master: String,
    pub host: String,
    /// Port `0` binds an ephemeral port.
    pub port: u16,
    /// Directory holding the shard files.
    pub dir: PathBuf,
    pub data_center: String,
    pub rack: String,
    /// Maximum number of concurrently running executors (the CPU count).
    pub max_executors: i32,
    pub memory_mb: i64,
    pub cpu_level: i32,
    /// Purge this port's shard files at startup.
    pub clean_restart: bool,
    /// Comma-separated capability tags advertised to the master.
    pub provided_resources: String,
    pub heartbeat_interval_ms: u64,
    pub tls: TlsConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            master: "127.0.0.1:8930".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8931,
            dir: std::env::temp_dir(),
            data_center: "defaultDataCenter".to_string(),
            rack: "defaultRack".to_string(),
            max_executors: 16,
            memory_mb: 1024,
            cpu_level: 1,
            clean_restart: true,
            provided_resources: String::new(),
            heartbeat_interval_ms: 5000,
            tls: TlsConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn new(master: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            master: master.into(),
            dir: dir.into(),
            ..Default::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_labels(mut self, data_center: &str, rack: &str) -> Self {
        self.data_center = data_center.to_string();
        self.rack = rack.to_string();
        self
    }

    /// Total capacity this node offers.
    pub fn total_resource(&self) -> ComputeResource {
        ComputeResource {
            cpu_count: self.max_executors,
            cpu_level: self.cpu_level,
            memory_mb: self.memory_mb,
        }
    }

    /// Reject settings the agent cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_ms == 0 {
            return Err(AgentError::Config(
                "heartbeat interval must be at least 1 ms".to_string(),
            ));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Provided capability tags, trimmed, empty entries dropped.
    pub fn provided_tags(&self) -> Vec<String> {
        self.provided_resources
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Where this agent sits in the cluster topology, given its bound port.
    pub fn location(&self, port: u16) -> Location {
        Location::new(&self.data_center, &self.rack, &self.host, port)
    }
}
