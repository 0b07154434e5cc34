// aethera-core/src/application/tracker.rs
//
// Externalizes orchestrator progress into a pollable form. One entry
// per caller-chosen task id; cancellation is a cooperative flag the
// orchestrator checks at stage boundaries.

use crate::domain::run::{ErrorRecord, RunStatus};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Shared cooperative cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub stage: String,
    pub progress_pct: f64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub status: RunStatus,
    pub progress: Option<ProgressEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

#[derive(Debug)]
struct TaskState {
    status: RunStatus,
    progress: Option<ProgressEvent>,
    result: Option<String>,
    error: Option<ErrorRecord>,
    cancel: CancellationFlag,
}

/// Process-wide tracker; the task broker's result backend in in-process form.
#[derive(Debug, Default)]
pub struct TaskTracker {
    tasks: DashMap<String, TaskState>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task id and hand back its cancellation flag. A live
    /// (non-terminal) registration is reused, so a caller may register and
    /// cancel before the orchestrator picks the task up.
    pub fn register(&self, task_id: &str) -> CancellationFlag {
        let mut entry = self.tasks.entry(task_id.to_string()).or_insert_with(|| TaskState {
            status: RunStatus::Pending,
            progress: None,
            result: None,
            error: None,
            cancel: CancellationFlag::default(),
        });
        if entry.status.is_terminal() {
            *entry = TaskState {
                status: RunStatus::Pending,
                progress: None,
                result: None,
                error: None,
                cancel: CancellationFlag::default(),
            };
        }
        entry.cancel.clone()
    }

    pub fn publish(&self, task_id: &str, stage: &str, progress_pct: f64, message: &str) {
        if let Some(mut state) = self.tasks.get_mut(task_id) {
            state.status = RunStatus::Processing;
            state.progress = Some(ProgressEvent {
                stage: stage.to_string(),
                progress_pct: progress_pct.clamp(0.0, 100.0),
                message: message.to_string(),
            });
        }
    }

    pub fn complete(&self, task_id: &str, run_id: &str) {
        if let Some(mut state) = self.tasks.get_mut(task_id) {
            state.status = RunStatus::Completed;
            state.result = Some(run_id.to_string());
        }
    }

    pub fn fail(&self, task_id: &str, error: ErrorRecord) {
        if let Some(mut state) = self.tasks.get_mut(task_id) {
            state.status = RunStatus::Failed;
            state.error = Some(error);
        }
    }

    pub fn revoke(&self, task_id: &str, run_id: &str) {
        if let Some(mut state) = self.tasks.get_mut(task_id) {
            state.status = RunStatus::Revoked;
            state.result = Some(run_id.to_string());
        }
    }

    pub fn get(&self, task_id: &str) -> Option<TaskSnapshot> {
        self.tasks.get(task_id).map(|state| TaskSnapshot {
            status: state.status,
            progress: state.progress.clone(),
            result: state.result.clone(),
            error: state.error.clone(),
        })
    }

    /// Request cooperative cancellation. Returns false for unknown tasks
    /// and for tasks already terminal.
    pub fn cancel(&self, task_id: &str) -> bool {
        match self.tasks.get(task_id) {
            Some(state) if !state.status.is_terminal() => {
                info!(task_id, "cancellation requested");
                state.cancel.cancel();
                true
            }
            _ => false,
        }
    }
}
