use thiserror::Error;
use uuid::Uuid;

use crate::protocol::ProtocolError;
use crate::resource::ComputeResource;
use crate::tls::TlsError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Insufficient resources: requested {requested}, available {available}")]
    ResourceExhausted {
        requested: ComputeResource,
        available: ComputeResource,
    },

    #[error("Executor not found: {0}")]
    ExecutorNotFound(Uuid),

    #[error("Executor {0} is not running")]
    ExecutorNotRunning(Uuid),

    #[error("Shard not found: {0}")]
    ShardNotFound(String),

    #[error("Invalid shard name: {0:?}")]
    InvalidShardName(String),

    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Failed to spawn executor: {0}")]
    Spawn(String),

    #[error("Agent rejected request: {0}")]
    Rejected(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    #[error("Heartbeat error: {0}")]
    Heartbeat(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
