pub mod plan;
pub mod score;

pub use plan::{ShardRef, Task, TaskGroup};
pub use score::{
    rank_candidates, shard_key, Candidate, LocalityScorer, Requirement, ShardLocator, Valuation,
    CAPABILITY_MISMATCH_PENALTY,
};
