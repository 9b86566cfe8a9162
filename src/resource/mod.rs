//! Compute capacity, cluster topology and placement candidates.
//!
//! - [`ComputeResource`]: a vector of CPU count, CPU level and memory
//! - [`Location`]: where a node or shard lives, with a topology distance
//! - [`Allocation`]: a candidate binding of work to a node
//! - [`ResourceLedger`]: total vs. allocated capacity of one node

pub mod ledger;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use ledger::{LedgerSnapshot, ResourceLedger};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComputeResource {
    pub cpu_count: i32,
    pub cpu_level: i32,
    pub memory_mb: i64,
}

impl ComputeResource {
    pub const fn new(cpu_count: i32, cpu_level: i32, memory_mb: i64) -> Self {
        Self {
            cpu_count,
            cpu_level,
            memory_mb,
        }
    }

    /// Component-wise addition, saturating at the numeric limits.
    pub fn plus(&self, other: &ComputeResource) -> ComputeResource {
        ComputeResource {
            cpu_count: self.cpu_count.saturating_add(other.cpu_count),
            cpu_level: self.cpu_level.saturating_add(other.cpu_level),
            memory_mb: self.memory_mb.saturating_add(other.memory_mb),
        }
    }

    /// Component-wise addition; `None` if any dimension overflows.
    pub fn checked_plus(&self, other: &ComputeResource) -> Option<ComputeResource> {
        Some(ComputeResource {
            cpu_count: self.cpu_count.checked_add(other.cpu_count)?,
            cpu_level: self.cpu_level.checked_add(other.cpu_level)?,
            memory_mb: self.memory_mb.checked_add(other.memory_mb)?,
        })
    }

    /// Component-wise subtraction, floored at zero.
    pub fn minus(&self, other: &ComputeResource) -> ComputeResource {
        ComputeResource {
            cpu_count: self.cpu_count.saturating_sub(other.cpu_count).max(0),
            cpu_level: self.cpu_level.saturating_sub(other.cpu_level).max(0),
            memory_mb: self.memory_mb.saturating_sub(other.memory_mb).max(0),
        }
    }

    /// True when every dimension of `self` is at least that of `other`.
    pub fn covers(&self, other: &ComputeResource) -> bool {
        self.cpu_count >= other.cpu_count
            && self.cpu_level >= other.cpu_level
            && self.memory_mb >= other.memory_mb
    }

    pub fn is_negative(&self) -> bool {
        self.cpu_count < 0 || self.cpu_level < 0 || self.memory_mb < 0
    }
}

impl fmt::Display for ComputeResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cpu={} level={} mem={}MB",
            self.cpu_count, self.cpu_level, self.memory_mb
        )
    }
}

/// Physical placement of an agent or a shard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub data_center: String,
    pub rack: String,
    pub host: String,
    pub port: u16,
}

impl Location {
    pub fn new(data_center: &str, rack: &str, host: &str, port: u16) -> Self {
        Self {
            data_center: data_center.to_string(),
            rack: rack.to_string(),
            host: host.to_string(),
            port,
        }
    }

    /// Topology cost of moving data between `self` and `other`.
    ///
    /// Zero only for the same agent; grows by an order of magnitude at each
    /// boundary crossed (process, host, rack, data center).
    pub fn distance(&self, other: &Location) -> f64 {
        if self.data_center != other.data_center {
            1000.0
        } else if self.rack != other.rack {
            100.0
        } else if self.host != other.host {
            10.0
        } else if self.port != other.port {
            1.0
        } else {
            0.0
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A candidate binding of a task group to a node.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub location: Location,
    pub provided_resources: BTreeSet<String>,
    pub resource: ComputeResource,
}

impl Allocation {
    pub fn new(location: Location, resource: ComputeResource) -> Self {
        Self {
            location,
            provided_resources: BTreeSet::new(),
            resource,
        }
    }

    pub fn with_provided<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.provided_resources
            .extend(tags.into_iter().map(Into::into));
        self
    }
}
