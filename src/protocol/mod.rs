//! Agent wire protocol.
//!
//! Every connection carries exactly one request. The first thing on the wire
//! is a frame (`u32` big-endian length, one flag byte, payload) whose payload
//! starts with one of three ASCII verbs:
//!
//! - `PUT <name>`: the rest of the stream is appended to shard `<name>`
//! - `GET <name>`: followed by a `u64` big-endian offset; the shard bytes from
//!   that offset are streamed back
//! - `CMD `: followed by a protobuf [`ControlMessage`]; the encoded reply, if
//!   any, is written back unframed

pub mod control;
pub mod frame;

use thiserror::Error;

pub use control::{control_message, ControlMessage, ExecutorStatus};
pub use frame::{
    parse_request, read_frame, read_offset, write_frame, write_offset, Flag, Frame, RequestHead,
    MAX_FRAME_LEN,
};

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),

    #[error("Empty frame")]
    EmptyFrame,

    #[error("Unknown frame flag: {0}")]
    UnknownFlag(u8),

    #[error("Unrecognized request: {0:?}")]
    UnknownRequest(String),

    #[error("Shard name is not valid UTF-8")]
    InvalidName,

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    #[error("Failed to decode control message: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
