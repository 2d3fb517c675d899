//! Workflow run domain types for flowrun.
//!
//! These are the serializable shapes that leave the engine: the run status
//! model polled by HTTP callers, the failure record captured when a step
//! throws, and the descriptive summary of a committed workflow.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shape::Shape;

/// Reserved context key under which the trigger input is stored.
pub const TRIGGER_KEY: &str = "trigger";

// ---------------------------------------------------------------------------
// Run status
// ---------------------------------------------------------------------------

/// Lifecycle status of a workflow run.
///
/// `pending -> running -> completed | failed`. The last two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Whether the run can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "pending"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("invalid run status: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure record
// ---------------------------------------------------------------------------

/// Why a run ended in `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The step body returned an error.
    StepExecution,
    /// The step's input view did not match its declared input shape.
    InvalidInput,
    /// The step exceeded the configured step timeout.
    Timeout,
    /// The step produced an output larger than the context allows.
    OutputTooLarge,
    /// The run was cancelled by a caller.
    Cancelled,
}

/// Failure detail captured on a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFailure {
    /// Id of the step that was executing when the run failed; `None` when
    /// the run was cancelled before its first step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub kind: FailureKind,
    /// Human-readable error message.
    pub message: String,
    /// How many times the step was attempted before giving up.
    pub attempts: u32,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step_id {
            Some(step_id) => write!(f, "step '{}' failed: {}", step_id, self.message),
            None => write!(f, "run failed before any step: {}", self.message),
        }
    }
}

// ---------------------------------------------------------------------------
// Status view (what pollers see)
// ---------------------------------------------------------------------------

/// Observable status of a run, as exposed to external callers.
///
/// `result` and `error` are mutually exclusive and only populated once the
/// status is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatusView {
    pub run_id: Uuid,
    pub workflow: String,
    pub status: RunStatus,
    /// Step currently executing, or the last one attempted.
    pub current_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunFailure>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Workflow summary (documentation export)
// ---------------------------------------------------------------------------

/// Serializable description of a committed workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub name: String,
    pub trigger_shape: Shape,
    /// Main-sequence steps in declared order.
    pub steps: Vec<StepSummary>,
    /// Conditional edges in attachment order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<BranchSummary>,
}

/// Description of a single step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSummary {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub input_shape: Shape,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,
}

/// Description of a conditional edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchSummary {
    /// Step after which the predicate is evaluated.
    pub after: String,
    pub condition: String,
    pub steps: Vec<StepSummary>,
}
