//! Client for the agent wire protocol.
//!
//! Each call opens a fresh connection, sends one request and reads until the
//! agent closes the connection.

use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::protocol::control::{
    control_message::Kind, DeleteShardRequest, ExecutorInfo, GetStatusRequest, GetStatusResponse,
    ListRequest, StartRequest, StartResponse, StopRequest,
};
use crate::protocol::{write_frame, write_offset, ControlMessage, Frame, ProtocolError, RequestHead};
use crate::tls::TlsIdentity;

trait Connection: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Connection for T {}

#[derive(Clone)]
pub struct AgentClient {
    addr: String,
    tls: Option<TlsConnector>,
}

impl AgentClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            tls: None,
        }
    }

    /// Client that connects over mutual TLS.
    pub fn with_tls(addr: impl Into<String>, identity: &TlsIdentity) -> Result<Self> {
        Ok(Self {
            addr: addr.into(),
            tls: Some(identity.connector()?),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Append `data` to shard `name` on the agent.
    ///
    /// Returns once the agent has written the bytes and closed the connection.
    pub async fn put(&self, name: &str, data: &[u8]) -> Result<()> {
        let mut conn = self.request(RequestHead::Put(name.to_string())).await?;
        conn.write_all(data).await?;
        conn.shutdown().await?;

        let mut rest = Vec::new();
        conn.read_to_end(&mut rest).await?;
        Ok(())
    }

    /// Read shard `name` from `offset` to its end.
    pub async fn get(&self, name: &str, offset: u64) -> Result<Vec<u8>> {
        let mut conn = self.request(RequestHead::Get(name.to_string())).await?;
        write_offset(&mut conn, offset).await?;
        conn.flush().await?;

        let mut data = Vec::new();
        conn.read_to_end(&mut data).await?;
        Ok(data)
    }

    /// Send a control message; `None` if the agent wrote no reply.
    pub async fn command(&self, message: ControlMessage) -> Result<Option<ControlMessage>> {
        let mut conn = self.request(RequestHead::Cmd(message)).await?;
        conn.shutdown().await?;

        let mut raw = Vec::new();
        conn.read_to_end(&mut raw).await?;
        if raw.is_empty() {
            return Ok(None);
        }
        let reply = ControlMessage::decode(raw.as_slice()).map_err(ProtocolError::from)?;
        Ok(Some(reply))
    }

    pub async fn start(&self, request: StartRequest) -> Result<StartResponse> {
        match self.expect_reply(Kind::StartRequest(request)).await? {
            Kind::StartResponse(resp) => Ok(resp),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn stop(&self, handle: Uuid) -> Result<()> {
        let request = Kind::StopRequest(StopRequest {
            handle: handle.to_string(),
        });
        match self.expect_reply(request).await? {
            Kind::StopResponse(resp) if resp.error.is_empty() => Ok(()),
            Kind::StopResponse(resp) => Err(AgentError::Rejected(resp.error)),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn status(&self, handle: Uuid) -> Result<GetStatusResponse> {
        let request = Kind::GetStatusRequest(GetStatusRequest {
            handle: handle.to_string(),
        });
        match self.expect_reply(request).await? {
            Kind::GetStatusResponse(resp) => Ok(resp),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn list(&self) -> Result<Vec<ExecutorInfo>> {
        match self.expect_reply(Kind::ListRequest(ListRequest {})).await? {
            Kind::ListResponse(resp) => Ok(resp.executors),
            other => Err(unexpected(&other)),
        }
    }

    /// Returns whether the shard existed.
    pub async fn delete_shard(&self, name: &str) -> Result<bool> {
        let request = Kind::DeleteShardRequest(DeleteShardRequest {
            name: name.to_string(),
        });
        match self.expect_reply(request).await? {
            Kind::DeleteShardResponse(resp) if resp.error.is_empty() => Ok(resp.deleted),
            Kind::DeleteShardResponse(resp) => Err(AgentError::Rejected(resp.error)),
            other => Err(unexpected(&other)),
        }
    }

    async fn expect_reply(&self, kind: Kind) -> Result<Kind> {
        self.command(ControlMessage::from(kind))
            .await?
            .and_then(|reply| reply.kind)
            .ok_or_else(|| ProtocolError::UnexpectedReply("no reply".to_string()).into())
    }

    async fn request(&self, head: RequestHead) -> Result<Box<dyn Connection>> {
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;

        let mut conn: Box<dyn Connection> = match &self.tls {
            Some(connector) => {
                let tls = connector.connect(TlsIdentity::server_name()?, stream).await?;
                Box::new(tls)
            }
            None => Box::new(stream),
        };

        write_frame(&mut conn, &Frame::data(head.to_payload())).await?;
        Ok(conn)
    }
}

fn unexpected(kind: &Kind) -> AgentError {
    ProtocolError::UnexpectedReply(format!("{kind:?}")).into()
}
