//! Event types for the run event bus.
//!
//! `RunEvent` is broadcast by the executor at every lifecycle transition.
//! All variants are Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events emitted while a workflow run executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// A run moved from pending to running.
    RunStarted { run_id: Uuid, workflow: String },

    /// A step is about to execute.
    StepStarted {
        run_id: Uuid,
        step_id: String,
        attempt: u32,
    },

    /// A step returned successfully and its output was written to context.
    StepCompleted {
        run_id: Uuid,
        step_id: String,
        duration_ms: u64,
    },

    /// A step attempt failed.
    StepFailed {
        run_id: Uuid,
        step_id: String,
        error: String,
        will_retry: bool,
    },

    /// A conditional edge evaluated to true and its steps were scheduled.
    BranchTaken {
        run_id: Uuid,
        after_step: String,
        condition: String,
        steps: Vec<String>,
    },

    /// The last scheduled step finished and the run completed.
    RunCompleted {
        run_id: Uuid,
        workflow: String,
        duration_ms: u64,
        steps_completed: u32,
    },

    /// The run failed.
    RunFailed {
        run_id: Uuid,
        workflow: String,
        step_id: Option<String>,
        error: String,
    },
}

impl RunEvent {
    /// The run this event belongs to.
    pub fn run_id(&self) -> Uuid {
        match self {
            RunEvent::RunStarted { run_id, .. }
            | RunEvent::StepStarted { run_id, .. }
            | RunEvent::StepCompleted { run_id, .. }
            | RunEvent::StepFailed { run_id, .. }
            | RunEvent::BranchTaken { run_id, .. }
            | RunEvent::RunCompleted { run_id, .. }
            | RunEvent::RunFailed { run_id, .. } => *run_id,
        }
    }

    /// Whether this event ends the run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::RunCompleted { .. } | RunEvent::RunFailed { .. })
    }
}
