//! Test harness for agent integration tests.
//!
//! Starts real agents on ephemeral ports in temporary directories, with
//! heartbeats captured in memory instead of posted to a master.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use shardline::client::AgentClient;
use shardline::config::AgentConfig;
use shardline::error::Result;
use shardline::server::{AgentServer, RequestHandler, ServerHandle};
use shardline::tls::TlsIdentity;
use shardline::worker::{HeartbeatReport, HeartbeatSink};

/// Heartbeat sink that forwards every report to a channel.
pub struct RecordingSink {
    tx: mpsc::UnboundedSender<HeartbeatReport>,
}

impl RecordingSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<HeartbeatReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl HeartbeatSink for RecordingSink {
    async fn send(&self, report: &HeartbeatReport) -> Result<()> {
        let _ = self.tx.send(report.clone());
        Ok(())
    }
}

/// Agent config with a fast heartbeat, bound to an ephemeral port.
pub fn test_agent_config(dir: &Path) -> AgentConfig {
    let mut config = AgentConfig::new("127.0.0.1:1", dir).with_port(0);
    config.max_executors = 4;
    config.memory_mb = 512;
    config.heartbeat_interval_ms = 50;
    config
}

/// Handle to a running test agent
pub struct TestAgent {
    pub addr: String,
    pub port: u16,
    pub dir: PathBuf,
    pub handler: Arc<RequestHandler>,
    pub heartbeats: mpsc::UnboundedReceiver<HeartbeatReport>,
    handle: ServerHandle,
    task: JoinHandle<Result<()>>,
    _temp: Option<TempDir>,
}

impl TestAgent {
    /// Start an agent in a fresh temporary directory.
    pub async fn start() -> Self {
        let temp = TempDir::new().unwrap();
        let config = test_agent_config(temp.path());
        let mut agent = Self::start_with(config, None).await;
        agent._temp = Some(temp);
        agent
    }

    /// Start an agent from an explicit config; the caller owns the directory.
    pub async fn start_with(config: AgentConfig, tls: Option<TlsIdentity>) -> Self {
        let (sink, heartbeats) = RecordingSink::new();
        let server = AgentServer::start_with(config, tls, sink).await.unwrap();

        let local = server.local_addr();
        let dir = server.dir().clone();
        let handler = server.handler().clone();
        let handle = server.handle();
        let task = tokio::spawn(server.run());

        Self {
            addr: local.to_string(),
            port: local.port(),
            dir,
            handler,
            heartbeats,
            handle,
            task,
            _temp: None,
        }
    }

    pub fn client(&self) -> AgentClient {
        AgentClient::new(&self.addr)
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Wait for the next heartbeat, failing the test after `timeout`.
    pub async fn next_heartbeat(&mut self, timeout: Duration) -> HeartbeatReport {
        tokio::time::timeout(timeout, self.heartbeats.recv())
            .await
            .expect("no heartbeat within timeout")
            .expect("heartbeat channel closed")
    }

    /// Stop the agent and wait for it to drain.
    pub async fn stop(self) -> Option<TempDir> {
        self.handle.stop().await;
        self.task.await.unwrap().unwrap();
        self._temp
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
