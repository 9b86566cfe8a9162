pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod resource;
pub mod scheduler;
pub mod server;
pub mod shutdown;
pub mod storage;
pub mod tls;
pub mod worker;

pub use client::AgentClient;
pub use config::{AgentConfig, TlsConfig};
pub use error::{AgentError, Result};
pub use server::{AgentServer, ServerHandle};
