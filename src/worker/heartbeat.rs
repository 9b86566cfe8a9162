use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::resource::{ComputeResource, ResourceLedger};

/// What an agent tells the master about itself on every beat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatReport {
    pub host: String,
    pub port: u16,
    pub total: ComputeResource,
    pub allocated: ComputeResource,
    pub data_center: String,
    pub rack: String,
    /// Free-form provided capability tags, comma-separated.
    pub resources: String,
}

/// Identity part of the report, fixed for the lifetime of the agent.
#[derive(Debug, Clone)]
pub struct AgentIdentity {
    pub host: String,
    pub port: u16,
    pub data_center: String,
    pub rack: String,
    pub resources: String,
}

impl AgentIdentity {
    /// Combine with a fresh ledger snapshot.
    pub fn report(&self, ledger: &ResourceLedger) -> HeartbeatReport {
        let snapshot = ledger.snapshot();
        HeartbeatReport {
            host: self.host.clone(),
            port: self.port,
            total: snapshot.total,
            allocated: snapshot.allocated,
            data_center: self.data_center.clone(),
            rack: self.rack.clone(),
            resources: self.resources.clone(),
        }
    }
}

/// Destination for heartbeat reports.
#[async_trait]
pub trait HeartbeatSink: Send + Sync {
    async fn send(&self, report: &HeartbeatReport) -> Result<()>;
}

/// Posts reports as JSON to `{scheme}://{master}/agent/update`.
pub struct HttpHeartbeatSink {
    client: reqwest::Client,
    url: String,
}

impl HttpHeartbeatSink {
    pub fn new(master: &str) -> Self {
        Self::with_client(reqwest::Client::new(), master, false)
    }

    pub fn with_client(client: reqwest::Client, master: &str, secure: bool) -> Self {
        let scheme = if secure { "https" } else { "http" };
        Self {
            client,
            url: format!("{scheme}://{master}/agent/update"),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HeartbeatSink for HttpHeartbeatSink {
    async fn send(&self, report: &HeartbeatReport) -> Result<()> {
        self.client
            .post(&self.url)
            .json(report)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Periodically reports the ledger to a [`HeartbeatSink`].
pub struct Heartbeater {
    identity: AgentIdentity,
    ledger: Arc<ResourceLedger>,
    sink: Arc<dyn HeartbeatSink>,
    interval: Duration,
}

impl Heartbeater {
    pub fn new(
        identity: AgentIdentity,
        ledger: Arc<ResourceLedger>,
        sink: Arc<dyn HeartbeatSink>,
        interval: Duration,
    ) -> Self {
        Self {
            identity,
            ledger,
            sink,
            interval,
        }
    }

    /// Beat until `shutdown` is cancelled. The first beat goes out immediately.
    ///
    /// A failed send is logged and retried on the next tick.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            host = %self.identity.host,
            port = self.identity.port,
            interval = ?self.interval,
            "Heartbeat loop started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.identity.report(&self.ledger);
                    match self.sink.send(&report).await {
                        Ok(()) => tracing::trace!(allocated = %report.allocated, "Heartbeat sent"),
                        Err(e) => tracing::warn!(error = %e, "Heartbeat failed"),
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Heartbeat loop shutting down");
                    break;
                }
            }
        }
    }
}
