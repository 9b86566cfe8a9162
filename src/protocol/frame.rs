use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::{ControlMessage, ProtocolError};

/// Upper bound on a single frame, flag byte included.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Flag {
    Data = 0,
    FullStop = 1,
    CloseChannel = 2,
}

impl TryFrom<u8> for Flag {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Flag::Data),
            1 => Ok(Flag::FullStop),
            2 => Ok(Flag::CloseChannel),
            other => Err(ProtocolError::UnknownFlag(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub flag: Flag,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn data(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            flag: Flag::Data,
            payload: payload.into(),
        }
    }
}

/// Read one length-prefixed frame.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len == 0 {
        return Err(ProtocolError::EmptyFrame);
    }
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    let flag = Flag::try_from(reader.read_u8().await?)?;
    let mut payload = vec![0u8; len - 1];
    reader.read_exact(&mut payload).await?;

    Ok(Frame { flag, payload })
}

pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let len = frame.payload.len() + 1;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    writer.write_u32(len as u32).await?;
    writer.write_u8(frame.flag as u8).await?;
    writer.write_all(&frame.payload).await?;
    Ok(())
}

pub async fn read_offset<R>(reader: &mut R) -> Result<u64, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    Ok(reader.read_u64().await?)
}

pub async fn write_offset<W>(writer: &mut W, offset: u64) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_u64(offset).await?;
    Ok(())
}

/// The request carried by the first data frame of a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestHead {
    Put(String),
    Get(String),
    Cmd(ControlMessage),
}

impl RequestHead {
    pub fn verb(&self) -> &'static str {
        match self {
            RequestHead::Put(_) => "PUT",
            RequestHead::Get(_) => "GET",
            RequestHead::Cmd(_) => "CMD",
        }
    }

    /// Encode as a frame payload.
    pub fn to_payload(&self) -> Vec<u8> {
        match self {
            RequestHead::Put(name) => format!("PUT {name}").into_bytes(),
            RequestHead::Get(name) => format!("GET {name}").into_bytes(),
            RequestHead::Cmd(msg) => {
                let mut buf = b"CMD ".to_vec();
                buf.extend_from_slice(&msg.encode_to_vec());
                buf
            }
        }
    }
}

pub fn parse_request(payload: &[u8]) -> Result<RequestHead, ProtocolError> {
    if let Some(rest) = payload.strip_prefix(b"PUT ") {
        Ok(RequestHead::Put(shard_name(rest)?))
    } else if let Some(rest) = payload.strip_prefix(b"GET ") {
        Ok(RequestHead::Get(shard_name(rest)?))
    } else if let Some(rest) = payload.strip_prefix(b"CMD ") {
        Ok(RequestHead::Cmd(ControlMessage::decode(rest)?))
    } else {
        let preview: String = String::from_utf8_lossy(payload).chars().take(32).collect();
        Err(ProtocolError::UnknownRequest(preview))
    }
}

fn shard_name(raw: &[u8]) -> Result<String, ProtocolError> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|_| ProtocolError::InvalidName)
}
