//! Work that happens on the agent's own node.
//!
//! - [`ExecutorManager`]: launches task programs, charges them to the
//!   [`ResourceLedger`](crate::resource::ResourceLedger), stops them and
//!   answers status queries
//! - [`heartbeat`]: periodic report of identity and capacity to the master
//!
//! # Execution Flow
//!
//! 1. A `CMD` connection carries a `StartRequest`
//! 2. [`ExecutorManager::launch`] charges the ledger and spawns the program
//! 3. A background waiter watches the process
//! 4. On exit or stop the charge is released and the outcome kept for
//!    status queries

pub mod executor;
pub mod heartbeat;

pub use executor::{ExecutorManager, ExecutorSnapshot, ExecutorState, LaunchSpec};
pub use heartbeat::{AgentIdentity, HeartbeatReport, HeartbeatSink, Heartbeater, HttpHeartbeatSink};
