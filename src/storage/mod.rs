//! Local storage for named data shards.

pub mod shard_store;

pub use shard_store::{ShardStore, SHARD_FILE_EXTENSION};
