use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::AgentConfig;
use crate::error::Result;
use crate::resource::{Location, ResourceLedger};
use crate::server::RequestHandler;
use crate::storage::ShardStore;
use crate::tls::TlsIdentity;
use crate::worker::{AgentIdentity, ExecutorManager, HeartbeatSink, Heartbeater, HttpHeartbeatSink};

/// Back-off after a failed `accept`, so a persistent error does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Stops a running [`AgentServer`] from another task.
#[derive(Clone)]
pub struct ServerHandle {
    shutdown: CancellationToken,
    stopped: CancellationToken,
}

impl ServerHandle {
    /// Stop accepting connections and wait until in-flight requests drained.
    ///
    /// Only returns once [`AgentServer::run`] has finished.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        self.stopped.cancelled().await;
    }

    /// Signal shutdown without waiting.
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_cancelled()
    }
}

/// One node's agent: listener, shard store, executors, ledger and heartbeat.
pub struct AgentServer {
    config: AgentConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    dir: PathBuf,
    acceptor: Option<TlsAcceptor>,
    handler: Arc<RequestHandler>,
    heartbeat_sink: Arc<dyn HeartbeatSink>,
    shutdown: CancellationToken,
    stopped: CancellationToken,
    tracker: TaskTracker,
}

impl AgentServer {
    /// Bind with TLS and heartbeat sink derived from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if TLS is required but cannot be loaded, or if the
    /// listener cannot be bound.
    pub async fn start(config: AgentConfig) -> Result<Self> {
        let tls = TlsIdentity::resolve(&config.tls).await?;
        let sink: Arc<dyn HeartbeatSink> = match &tls {
            Some(identity) => Arc::new(HttpHeartbeatSink::with_client(
                identity.http_client()?,
                &config.master,
                true,
            )),
            None => Arc::new(HttpHeartbeatSink::new(&config.master)),
        };
        Self::start_with(config, tls, sink).await
    }

    /// Bind the listener and prepare node state.
    ///
    /// With `clean_restart` set, shard files left by a previous agent on the
    /// same port are removed before any connection is accepted.
    pub async fn start_with(
        config: AgentConfig,
        tls: Option<TlsIdentity>,
        heartbeat_sink: Arc<dyn HeartbeatSink>,
    ) -> Result<Self> {
        config.validate()?;
        tokio::fs::create_dir_all(&config.dir).await?;
        let dir = tokio::fs::canonicalize(&config.dir).await?;

        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        let local_addr = listener.local_addr()?;
        let port = local_addr.port();
        let acceptor = tls.as_ref().map(TlsIdentity::acceptor).transpose()?;

        let store = Arc::new(ShardStore::new(&dir, port));
        if config.clean_restart {
            store.cleanup(port).await?;
        }

        let ledger = Arc::new(ResourceLedger::new(config.total_resource()));
        let executors = Arc::new(ExecutorManager::new(ledger.clone(), &dir));
        let handler = Arc::new(RequestHandler::new(store, executors, ledger));

        tracing::info!(
            addr = %local_addr,
            dir = %dir.display(),
            tls_enabled = acceptor.is_some(),
            total = %config.total_resource(),
            "Agent server started"
        );

        Ok(Self {
            config,
            listener,
            local_addr,
            dir,
            acceptor,
            handler,
            heartbeat_sink,
            shutdown: CancellationToken::new(),
            stopped: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Absolute shard directory.
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    pub fn location(&self) -> Location {
        self.config.location(self.local_addr.port())
    }

    pub fn handler(&self) -> &Arc<RequestHandler> {
        &self.handler
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: self.shutdown.clone(),
            stopped: self.stopped.clone(),
        }
    }

    /// Accept connections until shut down, then drain.
    ///
    /// Shutdown order: stop accepting and drop the listener, wait for every
    /// in-flight handler, stop the heartbeat, stop running executors.
    pub async fn run(self) -> Result<()> {
        let AgentServer {
            config,
            listener,
            local_addr,
            acceptor,
            handler,
            heartbeat_sink,
            shutdown,
            stopped,
            tracker,
            ..
        } = self;

        let identity = AgentIdentity {
            host: config.host.clone(),
            port: local_addr.port(),
            data_center: config.data_center.clone(),
            rack: config.rack.clone(),
            resources: config.provided_resources.clone(),
        };
        let heartbeater = Heartbeater::new(
            identity,
            handler.ledger.clone(),
            heartbeat_sink,
            config.heartbeat_interval(),
        );
        let heartbeat_task = tokio::spawn(heartbeater.run(shutdown.child_token()));

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::trace!(peer = %peer, "Connection accepted");
                        let handler = handler.clone();
                        let acceptor = acceptor.clone();
                        tracker.spawn(async move {
                            handler.serve(stream, peer, acceptor).await;
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                }
            }
        }

        drop(listener);
        tracing::info!(in_flight = tracker.len(), "Agent server draining");
        tracker.close();
        tracker.wait().await;

        if let Err(e) = heartbeat_task.await {
            tracing::warn!(error = %e, "Heartbeat task panicked");
        }
        handler.executors.stop_all().await;

        tracing::info!(addr = %local_addr, "Agent server stopped");
        stopped.cancel();
        Ok(())
    }
}
