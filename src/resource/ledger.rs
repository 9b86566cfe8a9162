use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::resource::ComputeResource;

/// Consistent view of a node's capacity at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub total: ComputeResource,
    pub allocated: ComputeResource,
}

impl LedgerSnapshot {
    pub fn available(&self) -> ComputeResource {
        self.total.minus(&self.allocated)
    }
}

#[derive(Debug)]
struct LedgerState {
    total: ComputeResource,
    allocated: ComputeResource,
}

/// Total vs. allocated compute capacity of one node.
///
/// Both figures live behind a single lock, so every snapshot satisfies
/// `allocated <= total` in each dimension.
#[derive(Debug)]
pub struct ResourceLedger {
    state: Mutex<LedgerState>,
}

impl ResourceLedger {
    pub fn new(total: ComputeResource) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                total,
                allocated: ComputeResource::default(),
            }),
        }
    }

    /// Reserve `request`, or fail without touching the ledger.
    pub fn allocate(&self, request: &ComputeResource) -> Result<()> {
        if request.is_negative() {
            return Err(AgentError::Config(format!(
                "negative resource request: {request}"
            )));
        }

        let mut state = self.state.lock();
        let wanted = state
            .allocated
            .checked_plus(request)
            .filter(|wanted| state.total.covers(wanted));
        let Some(wanted) = wanted else {
            let available = state.total.minus(&state.allocated);
            tracing::debug!(requested = %request, available = %available, "Allocation rejected");
            return Err(AgentError::ResourceExhausted {
                requested: *request,
                available,
            });
        };
        state.allocated = wanted;
        Ok(())
    }

    /// Return `resource` to the pool. Never drops below zero.
    pub fn release(&self, resource: &ComputeResource) {
        let mut state = self.state.lock();
        state.allocated = state.allocated.minus(resource);
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state.lock();
        LedgerSnapshot {
            total: state.total,
            allocated: state.allocated,
        }
    }

    pub fn available(&self) -> ComputeResource {
        self.snapshot().available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_release_restores() {
        let ledger = ResourceLedger::new(ComputeResource::new(4, 4, 4096));
        let requests = [
            ComputeResource::new(1, 1, 512),
            ComputeResource::new(2, 0, 1024),
            ComputeResource::new(1, 2, 2048),
        ];
        for r in &requests {
            ledger.allocate(r).unwrap();
        }
        assert_eq!(ledger.snapshot().allocated, ComputeResource::new(4, 3, 3584));

        for r in &requests {
            ledger.release(r);
        }
        assert_eq!(ledger.snapshot().allocated, ComputeResource::default());
    }

    #[test]
    fn over_allocation_leaves_ledger_unchanged() {
        let ledger = ResourceLedger::new(ComputeResource::new(2, 1, 1024));
        ledger.allocate(&ComputeResource::new(1, 0, 512)).unwrap();
        let before = ledger.snapshot();

        let err = ledger
            .allocate(&ComputeResource::new(1, 0, 513))
            .unwrap_err();
        assert!(matches!(err, AgentError::ResourceExhausted { .. }));
        assert_eq!(ledger.snapshot(), before);
    }

    #[test]
    fn negative_request_is_rejected() {
        let ledger = ResourceLedger::new(ComputeResource::new(2, 1, 1024));
        assert!(ledger.allocate(&ComputeResource::new(-1, 0, 0)).is_err());
        assert_eq!(ledger.snapshot().allocated, ComputeResource::default());
    }
}
