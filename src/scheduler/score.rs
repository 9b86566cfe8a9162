use std::collections::HashMap;
use std::sync::Arc;

use crate::resource::{Allocation, Location};
use crate::scheduler::plan::{ShardRef, TaskGroup};

/// Added per located input when the candidate lacks the required capability.
pub const CAPABILITY_MISMATCH_PENALTY: f64 = 10_000.0;

/// Where shards live, as known to the directory service.
pub trait ShardLocator {
    fn shard_location(&self, key: &str) -> Option<Location>;
}

impl ShardLocator for HashMap<String, Location> {
    fn shard_location(&self, key: &str) -> Option<Location> {
        self.get(key).cloned()
    }
}

impl<T: ShardLocator + ?Sized> ShardLocator for Arc<T> {
    fn shard_location(&self, key: &str) -> Option<Location> {
        (**self).shard_location(key)
    }
}

/// Pending demand as seen by the scorer.
pub trait Requirement {
    /// Inputs of the task standing for the whole requirement.
    fn representative_inputs(&self) -> &[ShardRef];

    fn required_resource(&self) -> Option<&str>;
}

/// A placement candidate as seen by the scorer.
pub trait Candidate {
    fn location(&self) -> &Location;

    fn provides(&self, tag: &str) -> bool;
}

impl Requirement for TaskGroup {
    fn representative_inputs(&self) -> &[ShardRef] {
        self.representative()
            .map(|t| t.inputs.as_slice())
            .unwrap_or_default()
    }

    fn required_resource(&self) -> Option<&str> {
        self.required_resource.as_deref().filter(|tag| !tag.is_empty())
    }
}

impl Candidate for Allocation {
    fn location(&self) -> &Location {
        &self.location
    }

    fn provides(&self, tag: &str) -> bool {
        self.provided_resources.contains(tag)
    }
}

/// Scoring contract used by the auction engine. Higher is better.
pub trait Valuation<R: ?Sized, O: ?Sized> {
    fn score(&self, requirement: &R, bid: f64, object: &O) -> f64;
}

/// Key under which the directory tracks a shard of one deployment.
pub fn shard_key(executable_hash: &str, shard_name: &str) -> String {
    format!("{executable_hash}-{shard_name}")
}

/// Bid divided by a locality and capability cost.
///
/// The cost starts at 1. Every input of the representative task whose
/// location is known adds its distance to the candidate, plus
/// [`CAPABILITY_MISMATCH_PENALTY`] when the candidate lacks the required
/// capability. Inputs the directory does not know yet add nothing.
pub struct LocalityScorer<L> {
    locator: L,
    executable_hash: String,
}

impl<L: ShardLocator> LocalityScorer<L> {
    pub fn new(locator: L, executable_hash: impl Into<String>) -> Self {
        Self {
            locator,
            executable_hash: executable_hash.into(),
        }
    }

    /// The denominator of [`Valuation::score`].
    pub fn cost<R, O>(&self, requirement: &R, object: &O) -> f64
    where
        R: Requirement + ?Sized,
        O: Candidate + ?Sized,
    {
        let mismatch = requirement
            .required_resource()
            .is_some_and(|tag| !object.provides(tag));

        let mut cost = 1.0;
        for input in requirement.representative_inputs() {
            let key = shard_key(&self.executable_hash, input.name());
            let Some(location) = self.locator.shard_location(&key) else {
                tracing::trace!(shard = input.name(), "Shard location unknown, skipping");
                continue;
            };
            if mismatch {
                cost += CAPABILITY_MISMATCH_PENALTY;
            }
            cost += location.distance(object.location());
        }
        cost
    }
}

impl<L, R, O> Valuation<R, O> for LocalityScorer<L>
where
    L: ShardLocator,
    R: Requirement + ?Sized,
    O: Candidate + ?Sized,
{
    fn score(&self, requirement: &R, bid: f64, object: &O) -> f64 {
        bid / self.cost(requirement, object)
    }
}

/// Candidate indices with their scores, best first. Ties keep input order.
pub fn rank_candidates<V, R, O>(
    valuation: &V,
    requirement: &R,
    bid: f64,
    candidates: &[O],
) -> Vec<(usize, f64)>
where
    V: Valuation<R, O>,
{
    let mut ranked: Vec<(usize, f64)> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, valuation.score(requirement, bid, c)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
}
