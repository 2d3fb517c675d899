//! Step definitions and the step body contract.
//!
//! A step body implements [`Executable`]: it receives a [`StepContext`]
//! scoped to the outputs it declared in `requires`, plus the
//! [`RuntimeHandle`] for agents and tools, and returns a serializable
//! output. The executor erases the body behind [`ExecutableDyn`] and stores
//! the output as JSON in the run's context.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use flowrun_types::llm::AgentError;
use flowrun_types::shape::{Shape, ShapeError};
use flowrun_types::tool::ToolError;
use flowrun_types::workflow::{FailureKind, StepSummary, TRIGGER_KEY};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::collab::RuntimeHandle;

use super::context::StepContext;

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// Errors a step body (or the engine around it) can produce.
#[derive(Debug, Clone, Error)]
pub enum StepError {
    /// The step body failed. The message is surfaced to pollers verbatim.
    #[error("{0}")]
    Failed(String),

    /// A failure that may succeed when retried (rate limits, outages).
    #[error("transient failure: {0}")]
    Transient(String),

    /// The step read an id it did not declare in `requires`.
    #[error("step output '{requested}' was read but not declared in requires")]
    UndeclaredDependency { requested: String },

    /// A declared dependency has no recorded output (its branch was skipped).
    #[error("no output recorded for step '{0}'")]
    MissingOutput(String),

    /// A recorded output could not be decoded into the requested type.
    #[error("cannot decode output of '{step_id}': {message}")]
    Decode { step_id: String, message: String },

    /// The step's input view did not match its declared input shape.
    #[error("input does not match declared shape: {0}")]
    InvalidInput(ShapeError),

    /// The step exceeded the configured step timeout.
    #[error("step timed out after {0:?}")]
    Timeout(Duration),

    /// The run was cancelled while the step was executing.
    #[error("run cancelled")]
    Cancelled,
}

impl StepError {
    pub fn failed(message: impl fmt::Display) -> Self {
        StepError::Failed(message.to_string())
    }

    /// Whether the executor may re-attempt the step.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StepError::Transient(_) | StepError::Timeout(_))
    }

    /// Failure classification recorded on the run.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            StepError::InvalidInput(_) => FailureKind::InvalidInput,
            StepError::Timeout(_) => FailureKind::Timeout,
            StepError::Cancelled => FailureKind::Cancelled,
            _ => FailureKind::StepExecution,
        }
    }
}

impl From<AgentError> for StepError {
    fn from(err: AgentError) -> Self {
        if err.is_retryable() {
            StepError::Transient(format!("agent: {err}"))
        } else {
            StepError::Failed(format!("agent: {err}"))
        }
    }
}

impl From<ToolError> for StepError {
    fn from(err: ToolError) -> Self {
        if err.is_retryable() {
            StepError::Transient(format!("tool: {err}"))
        } else {
            StepError::Failed(format!("tool: {err}"))
        }
    }
}

// ---------------------------------------------------------------------------
// Executable
// ---------------------------------------------------------------------------

/// The body of a step.
pub trait Executable: Send + Sync {
    type Output: Serialize + Send;

    fn execute(
        &self,
        ctx: StepContext,
        rt: RuntimeHandle,
    ) -> impl Future<Output = Result<Self::Output, StepError>> + Send;
}

/// Boxed future returned by [`ExecutableDyn::execute_boxed`].
pub type StepFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, StepError>> + Send + 'a>>;

/// Object-safe version of [`Executable`] producing JSON output.
pub trait ExecutableDyn: Send + Sync {
    fn execute_boxed(&self, ctx: StepContext, rt: RuntimeHandle) -> StepFuture<'_>;
}

impl<T: Executable> ExecutableDyn for T {
    fn execute_boxed(&self, ctx: StepContext, rt: RuntimeHandle) -> StepFuture<'_> {
        Box::pin(async move {
            let output = self.execute(ctx, rt).await?;
            serde_json::to_value(output)
                .map_err(|e| StepError::Failed(format!("step output is not serializable: {e}")))
        })
    }
}

/// Adapter turning an async closure into a step body.
///
/// ```ignore
/// let body = FnStep::new(|ctx: StepContext, _rt| async move {
///     let name: String = ctx.trigger_field("name")?;
///     Ok(serde_json::json!({ "greeting": format!("hello {name}") }))
/// });
/// ```
pub struct FnStep {
    f: Box<dyn Fn(StepContext, RuntimeHandle) -> StepFuture<'static> + Send + Sync>,
}

impl FnStep {
    pub fn new<F, Fut, O>(f: F) -> Self
    where
        F: Fn(StepContext, RuntimeHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, StepError>> + Send + 'static,
        O: Serialize + Send + 'static,
    {
        Self {
            f: Box::new(move |ctx, rt| {
                let fut = f(ctx, rt);
                Box::pin(async move {
                    let output = fut.await?;
                    serde_json::to_value(output).map_err(|e| {
                        StepError::Failed(format!("step output is not serializable: {e}"))
                    })
                })
            }),
        }
    }
}

impl Executable for FnStep {
    type Output = Value;

    fn execute(
        &self,
        ctx: StepContext,
        rt: RuntimeHandle,
    ) -> impl Future<Output = Result<Value, StepError>> + Send {
        (self.f)(ctx, rt)
    }
}

// ---------------------------------------------------------------------------
// StepDefinition
// ---------------------------------------------------------------------------

/// A named unit of work inside a workflow.
///
/// Cloning is cheap: the body is shared behind an `Arc`.
#[derive(Clone)]
pub struct StepDefinition {
    id: String,
    description: String,
    input_shape: Shape,
    requires: Vec<String>,
    body: Arc<dyn ExecutableDyn>,
}

impl StepDefinition {
    pub fn new(id: impl Into<String>, body: impl Executable + 'static) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            input_shape: Shape::any(),
            requires: Vec::new(),
            body: Arc::new(body),
        }
    }

    /// Shorthand for `StepDefinition::new(id, FnStep::new(f))`.
    pub fn from_fn<F, Fut, O>(id: impl Into<String>, f: F) -> Self
    where
        F: Fn(StepContext, RuntimeHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, StepError>> + Send + 'static,
        O: Serialize + Send + 'static,
    {
        Self::new(id, FnStep::new(f))
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declare the shape of this step's input view.
    pub fn input(mut self, shape: Shape) -> Self {
        self.input_shape = shape;
        self
    }

    /// Declare the prior step outputs this step reads. The trigger is always
    /// readable and need not be listed.
    pub fn requires<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in ids {
            let id = id.into();
            if id != TRIGGER_KEY && !self.requires.contains(&id) {
                self.requires.push(id);
            }
        }
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_shape(&self) -> &Shape {
        &self.input_shape
    }

    pub fn required_steps(&self) -> &[String] {
        &self.requires
    }

    pub(crate) fn body(&self) -> &dyn ExecutableDyn {
        self.body.as_ref()
    }

    pub fn summary(&self) -> StepSummary {
        StepSummary {
            id: self.id.clone(),
            description: self.description.clone(),
            input_shape: self.input_shape.clone(),
            requires: self.requires.clone(),
        }
    }
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("id", &self.id)
            .field("requires", &self.requires)
            .finish_non_exhaustive()
    }
}
