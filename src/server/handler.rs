use std::net::SocketAddr;
use std::sync::Arc;

use prost::Message;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;

use crate::error::Result;
use crate::protocol::{parse_request, read_frame, read_offset, Flag, RequestHead};
use crate::resource::ResourceLedger;
use crate::server::control;
use crate::storage::ShardStore;
use crate::worker::ExecutorManager;

/// Serves one request per connection against the node's shared state.
pub struct RequestHandler {
    pub store: Arc<ShardStore>,
    pub executors: Arc<ExecutorManager>,
    pub ledger: Arc<ResourceLedger>,
}

impl RequestHandler {
    pub fn new(
        store: Arc<ShardStore>,
        executors: Arc<ExecutorManager>,
        ledger: Arc<ResourceLedger>,
    ) -> Self {
        Self {
            store,
            executors,
            ledger,
        }
    }

    /// Finish the TLS handshake if the listener is secured, then handle the request.
    ///
    /// A failed handshake drops the connection without reading anything.
    pub async fn serve(&self, stream: TcpStream, peer: SocketAddr, acceptor: Option<TlsAcceptor>) {
        match acceptor {
            Some(acceptor) => match acceptor.accept(stream).await {
                Ok(tls) => self.handle(tls, peer).await,
                Err(e) => {
                    tracing::warn!(peer = %peer, error = %e, "TLS handshake failed");
                }
            },
            None => self.handle(stream, peer).await,
        }
    }

    /// Handle one request. Failures only affect this connection.
    pub async fn handle<S>(&self, mut conn: S, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if let Err(e) = self.dispatch(&mut conn).await {
            tracing::warn!(peer = %peer, error = %e, "Request failed, dropping connection");
        }
        if let Err(e) = conn.shutdown().await {
            tracing::debug!(peer = %peer, error = %e, "Connection shutdown failed");
        }
    }

    async fn dispatch<S>(&self, conn: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let frame = read_frame(conn).await?;
        if frame.flag != Flag::Data {
            tracing::warn!(
                flag = ?frame.flag,
                len = frame.payload.len(),
                "Unexpected frame flag on request"
            );
            return Ok(());
        }

        let head = parse_request(&frame.payload)?;
        tracing::debug!(verb = head.verb(), "Request received");

        match head {
            RequestHead::Put(name) => {
                let written = self.store.write_from(&name, conn).await?;
                tracing::debug!(shard = %name, bytes = written, "PUT complete");
            }
            RequestHead::Get(name) => {
                let offset = read_offset(conn).await?;
                let sent = self.store.read_to(&name, offset, conn).await?;
                tracing::debug!(shard = %name, offset, bytes = sent, "GET complete");
            }
            RequestHead::Cmd(message) => {
                if let Some(reply) = control::dispatch(self, message).await {
                    conn.write_all(&reply.encode_to_vec()).await?;
                    conn.flush().await?;
                }
            }
        }
        Ok(())
    }
}
