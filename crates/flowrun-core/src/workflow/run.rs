//! A single execution of a committed workflow.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use flowrun_types::workflow::{RunFailure, RunStatus, RunStatusView};
use serde_json::Value;
use uuid::Uuid;

use super::context::Context;
use super::definition::Workflow;
use super::executor::ExecutorError;

/// State of one workflow run.
///
/// Runs are created `pending` by the executor and only the executor moves
/// them through `running` to `completed` or `failed`.
#[derive(Debug, Clone)]
pub struct Run {
    pub(crate) id: Uuid,
    pub(crate) workflow: Arc<Workflow>,
    pub(crate) status: RunStatus,
    pub(crate) current_step: Option<String>,
    pub(crate) context: Context,
    pub(crate) result: Option<Value>,
    pub(crate) error: Option<RunFailure>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
}

impl Run {
    pub(crate) fn new(workflow: Arc<Workflow>, trigger: Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            workflow,
            status: RunStatus::Pending,
            current_step: None,
            context: Context::new(trigger),
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn workflow(&self) -> &Arc<Workflow> {
        &self.workflow
    }

    pub fn workflow_name(&self) -> &str {
        self.workflow.name()
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Step currently executing, or the last one attempted.
    pub fn current_step(&self) -> Option<&str> {
        self.current_step.as_deref()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Output of the last executed step, once completed.
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&RunFailure> {
        self.error.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Observable status for pollers.
    pub fn view(&self) -> RunStatusView {
        RunStatusView {
            run_id: self.id,
            workflow: self.workflow.name().to_string(),
            status: self.status,
            current_step: self.current_step.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }

    /// The run's result once terminal: the last step output, or the failure.
    pub fn outcome(&self) -> Result<Option<&Value>, ExecutorError> {
        match (self.status, &self.error) {
            (RunStatus::Completed, _) => Ok(self.result.as_ref()),
            (RunStatus::Failed, Some(failure)) => Err(ExecutorError::StepExecution(failure.clone())),
            (status, _) => Err(ExecutorError::IllegalState(format!(
                "run {} is {status}",
                self.id
            ))),
        }
    }

    pub(crate) fn mark_running(&mut self) {
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn mark_completed(&mut self, result: Option<Value>) {
        self.status = RunStatus::Completed;
        self.result = result;
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn mark_failed(&mut self, failure: RunFailure) {
        self.status = RunStatus::Failed;
        self.error = Some(failure);
        self.completed_at = Some(Utc::now());
    }
}
