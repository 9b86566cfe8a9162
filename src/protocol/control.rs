//! Protobuf control messages exchanged after a `CMD ` prefix.
//!
//! Requests and replies share the [`ControlMessage`] envelope; the oneof
//! tells them apart.

use crate::resource::ComputeResource;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResourceSpec {
    #[prost(int32, tag = "1")]
    pub cpu_count: i32,
    #[prost(int32, tag = "2")]
    pub cpu_level: i32,
    #[prost(int64, tag = "3")]
    pub memory_mb: i64,
}

impl From<ComputeResource> for ResourceSpec {
    fn from(r: ComputeResource) -> Self {
        Self {
            cpu_count: r.cpu_count,
            cpu_level: r.cpu_level,
            memory_mb: r.memory_mb,
        }
    }
}

impl From<ResourceSpec> for ComputeResource {
    fn from(r: ResourceSpec) -> Self {
        ComputeResource::new(r.cpu_count, r.cpu_level, r.memory_mb)
    }
}

/// Launch a program on the agent.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StartRequest {
    #[prost(string, tag = "1")]
    pub path: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "2")]
    pub args: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    /// Working directory; empty means the agent's shard directory.
    #[prost(string, tag = "3")]
    pub dir: ::prost::alloc::string::String,
    /// Capacity charged while the program runs; absent means one CPU.
    #[prost(message, optional, tag = "4")]
    pub resource: ::core::option::Option<ResourceSpec>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StartResponse {
    #[prost(string, tag = "1")]
    pub handle: ::prost::alloc::string::String,
    #[prost(uint32, tag = "2")]
    pub pid: u32,
    #[prost(string, tag = "3")]
    pub error: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StopRequest {
    #[prost(string, tag = "1")]
    pub handle: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StopResponse {
    #[prost(string, tag = "1")]
    pub error: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetStatusRequest {
    #[prost(string, tag = "1")]
    pub handle: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetStatusResponse {
    #[prost(string, tag = "1")]
    pub handle: ::prost::alloc::string::String,
    #[prost(enumeration = "ExecutorStatus", tag = "2")]
    pub status: i32,
    #[prost(int32, optional, tag = "3")]
    pub exit_code: ::core::option::Option<i32>,
    #[prost(string, tag = "4")]
    pub error: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExecutorInfo {
    #[prost(string, tag = "1")]
    pub handle: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub path: ::prost::alloc::string::String,
    #[prost(uint32, tag = "3")]
    pub pid: u32,
    #[prost(int64, tag = "4")]
    pub started_at_ms: i64,
    #[prost(message, optional, tag = "5")]
    pub resource: ::core::option::Option<ResourceSpec>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListResponse {
    #[prost(message, repeated, tag = "1")]
    pub executors: ::prost::alloc::vec::Vec<ExecutorInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteShardRequest {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteShardResponse {
    #[prost(bool, tag = "1")]
    pub deleted: bool,
    #[prost(string, tag = "2")]
    pub error: ::prost::alloc::string::String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ExecutorStatus {
    Unknown = 0,
    Running = 1,
    Completed = 2,
    Failed = 3,
    Stopped = 4,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControlMessage {
    #[prost(oneof = "control_message::Kind", tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10")]
    pub kind: ::core::option::Option<control_message::Kind>,
}

pub mod control_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Kind {
        #[prost(message, tag = "1")]
        StartRequest(super::StartRequest),
        #[prost(message, tag = "2")]
        StartResponse(super::StartResponse),
        #[prost(message, tag = "3")]
        StopRequest(super::StopRequest),
        #[prost(message, tag = "4")]
        StopResponse(super::StopResponse),
        #[prost(message, tag = "5")]
        GetStatusRequest(super::GetStatusRequest),
        #[prost(message, tag = "6")]
        GetStatusResponse(super::GetStatusResponse),
        #[prost(message, tag = "7")]
        ListRequest(super::ListRequest),
        #[prost(message, tag = "8")]
        ListResponse(super::ListResponse),
        #[prost(message, tag = "9")]
        DeleteShardRequest(super::DeleteShardRequest),
        #[prost(message, tag = "10")]
        DeleteShardResponse(super::DeleteShardResponse),
    }
}

impl From<control_message::Kind> for ControlMessage {
    fn from(kind: control_message::Kind) -> Self {
        Self { kind: Some(kind) }
    }
}
