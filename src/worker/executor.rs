use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::protocol::control::{ExecutorInfo, ExecutorStatus, StartRequest};
use crate::resource::{ComputeResource, ResourceLedger};

/// Finished executions kept around for status queries.
const FINISHED_HISTORY: usize = 1024;

/// Capacity charged when a start request does not name any.
pub const DEFAULT_TASK_RESOURCE: ComputeResource = ComputeResource::new(1, 0, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutorState {
    Running,
    Completed,
    Failed,
    Stopped,
}

impl ExecutorState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutorState::Running)
    }
}

impl std::fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorState::Running => write!(f, "running"),
            ExecutorState::Completed => write!(f, "completed"),
            ExecutorState::Failed => write!(f, "failed"),
            ExecutorState::Stopped => write!(f, "stopped"),
        }
    }
}

impl From<ExecutorState> for ExecutorStatus {
    fn from(state: ExecutorState) -> Self {
        match state {
            ExecutorState::Running => ExecutorStatus::Running,
            ExecutorState::Completed => ExecutorStatus::Completed,
            ExecutorState::Failed => ExecutorStatus::Failed,
            ExecutorState::Stopped => ExecutorStatus::Stopped,
        }
    }
}

/// What to run and what it costs.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub path: String,
    pub args: Vec<String>,
    pub dir: Option<PathBuf>,
    pub resource: ComputeResource,
}

impl LaunchSpec {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
            dir: None,
            resource: DEFAULT_TASK_RESOURCE,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_resource(mut self, resource: ComputeResource) -> Self {
        self.resource = resource;
        self
    }
}

impl From<StartRequest> for LaunchSpec {
    fn from(req: StartRequest) -> Self {
        Self {
            path: req.path,
            args: req.args,
            dir: (!req.dir.is_empty()).then(|| PathBuf::from(req.dir)),
            resource: req
                .resource
                .map(ComputeResource::from)
                .unwrap_or(DEFAULT_TASK_RESOURCE),
        }
    }
}

/// Point-in-time view of one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorSnapshot {
    pub handle: Uuid,
    pub path: String,
    pub pid: Option<u32>,
    pub resource: ComputeResource,
    pub state: ExecutorState,
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&ExecutorSnapshot> for ExecutorInfo {
    fn from(s: &ExecutorSnapshot) -> Self {
        ExecutorInfo {
            handle: s.handle.to_string(),
            path: s.path.clone(),
            pid: s.pid.unwrap_or_default(),
            started_at_ms: s.started_at.timestamp_millis(),
            resource: Some(s.resource.into()),
        }
    }
}

struct LiveExecutor {
    snapshot: ExecutorSnapshot,
    cancel: CancellationToken,
    waiter: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct ExecutorTable {
    live: HashMap<Uuid, LiveExecutor>,
    finished: VecDeque<ExecutorSnapshot>,
}

impl ExecutorTable {
    fn finish(&mut self, handle: Uuid, state: ExecutorState, exit_code: Option<i32>) {
        let Some(entry) = self.live.remove(&handle) else {
            return;
        };
        let mut snapshot = entry.snapshot;
        snapshot.state = state;
        snapshot.exit_code = exit_code;
        snapshot.finished_at = Some(Utc::now());

        if self.finished.len() >= FINISHED_HISTORY {
            self.finished.pop_front();
        }
        self.finished.push_back(snapshot);
    }

    fn find_finished(&self, handle: &Uuid) -> Option<&ExecutorSnapshot> {
        self.finished.iter().rev().find(|s| s.handle == *handle)
    }
}

/// Runs task programs on this node and charges them to the resource ledger.
///
/// Each launch gets a fresh handle. A background waiter owns the child
/// process; it releases the charged resource exactly once, when the process
/// exits or is stopped, and moves the entry to the finished history.
pub struct ExecutorManager {
    ledger: Arc<ResourceLedger>,
    default_dir: PathBuf,
    table: Arc<Mutex<ExecutorTable>>,
}

impl ExecutorManager {
    pub fn new(ledger: Arc<ResourceLedger>, default_dir: impl Into<PathBuf>) -> Self {
        Self {
            ledger,
            default_dir: default_dir.into(),
            table: Arc::new(Mutex::new(ExecutorTable::default())),
        }
    }

    pub fn ledger(&self) -> &Arc<ResourceLedger> {
        &self.ledger
    }

    /// Charge the ledger and spawn the program. Must be called inside a tokio runtime.
    pub fn launch(&self, spec: LaunchSpec) -> Result<ExecutorSnapshot> {
        self.ledger.allocate(&spec.resource)?;

        let dir = spec.dir.clone().unwrap_or_else(|| self.default_dir.clone());
        let child = Command::new(&spec.path)
            .args(&spec.args)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) => {
                self.ledger.release(&spec.resource);
                tracing::warn!(path = %spec.path, error = %e, "Failed to spawn executor");
                return Err(AgentError::Spawn(format!("{}: {e}", spec.path)));
            }
        };

        let handle = Uuid::new_v4();
        let snapshot = ExecutorSnapshot {
            handle,
            path: spec.path,
            pid: child.id(),
            resource: spec.resource,
            state: ExecutorState::Running,
            exit_code: None,
            started_at: Utc::now(),
            finished_at: None,
        };
        let cancel = CancellationToken::new();

        tracing::info!(
            handle = %handle,
            path = %snapshot.path,
            pid = ?snapshot.pid,
            resource = %snapshot.resource,
            "Executor launched"
        );

        let mut table = self.table.lock();
        let waiter = tokio::spawn(supervise(
            child,
            handle,
            cancel.clone(),
            self.table.clone(),
            self.ledger.clone(),
            snapshot.resource,
        ));
        table.live.insert(
            handle,
            LiveExecutor {
                snapshot: snapshot.clone(),
                cancel,
                waiter: Some(waiter),
            },
        );

        Ok(snapshot)
    }

    /// Kill a running executor and wait until its resources are released.
    pub async fn stop(&self, handle: Uuid) -> Result<()> {
        let waiter = {
            let mut table = self.table.lock();
            let finished = table.find_finished(&handle).is_some();
            match table.live.get_mut(&handle) {
                Some(entry) => {
                    entry.cancel.cancel();
                    entry.waiter.take()
                }
                None if finished => {
                    return Err(AgentError::ExecutorNotRunning(handle));
                }
                None => return Err(AgentError::ExecutorNotFound(handle)),
            }
        };

        // A concurrent stop already took the waiter; it will do the join.
        if let Some(waiter) = waiter {
            if let Err(e) = waiter.await {
                tracing::warn!(handle = %handle, error = %e, "Executor waiter panicked");
            }
        }
        Ok(())
    }

    /// Stop every live executor. Used on agent shutdown.
    pub async fn stop_all(&self) {
        let handles: Vec<Uuid> = self.table.lock().live.keys().copied().collect();
        for handle in handles {
            if let Err(e) = self.stop(handle).await {
                tracing::debug!(handle = %handle, error = %e, "Executor already gone at shutdown");
            }
        }
    }

    pub fn status(&self, handle: Uuid) -> Result<ExecutorSnapshot> {
        let table = self.table.lock();
        table
            .live
            .get(&handle)
            .map(|e| e.snapshot.clone())
            .or_else(|| table.find_finished(&handle).cloned())
            .ok_or(AgentError::ExecutorNotFound(handle))
    }

    /// Live executors, oldest first.
    pub fn list(&self) -> Vec<ExecutorSnapshot> {
        let mut live: Vec<ExecutorSnapshot> = self
            .table
            .lock()
            .live
            .values()
            .map(|e| e.snapshot.clone())
            .collect();
        live.sort_by_key(|s| s.started_at);
        live
    }

    pub fn live_count(&self) -> usize {
        self.table.lock().live.len()
    }
}

async fn supervise(
    mut child: Child,
    handle: Uuid,
    cancel: CancellationToken,
    table: Arc<Mutex<ExecutorTable>>,
    ledger: Arc<ResourceLedger>,
    resource: ComputeResource,
) {
    let (state, exit_code) = tokio::select! {
        status = child.wait() => classify_exit(handle, status),
        _ = cancel.cancelled() => {
            if let Err(e) = child.kill().await {
                tracing::warn!(handle = %handle, error = %e, "Failed to kill executor");
            }
            (ExecutorState::Stopped, None)
        }
    };

    ledger.release(&resource);
    table.lock().finish(handle, state, exit_code);

    tracing::info!(handle = %handle, state = %state, exit_code = ?exit_code, "Executor finished");
}

fn classify_exit(
    handle: Uuid,
    status: std::io::Result<ExitStatus>,
) -> (ExecutorState, Option<i32>) {
    match status {
        Ok(status) if status.success() => (ExecutorState::Completed, status.code()),
        Ok(status) => (ExecutorState::Failed, status.code()),
        Err(e) => {
            tracing::error!(handle = %handle, error = %e, "Waiting on executor failed");
            (ExecutorState::Failed, None)
        }
    }
}
