//! Network entry point of an agent.
//!
//! [`AgentServer`] owns the listener, the drain tracker and the heartbeat
//! task; every accepted connection is served by a [`RequestHandler`] on its
//! own tokio task. `CMD` requests are answered by [`control::dispatch`].

pub mod agent;
pub mod control;
pub mod handler;

pub use agent::{AgentServer, ServerHandle};
pub use handler::RequestHandler;
