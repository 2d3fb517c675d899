//! Workflow definitions: step sequences, conditional edges and commit.
//!
//! A `Workflow` is built incrementally with [`Workflow::step`] and
//! [`Workflow::when`], then frozen with [`Workflow::commit`]. Only committed
//! workflows can be registered in a catalog or executed.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use flowrun_types::shape::{Shape, ShapeError};
use flowrun_types::workflow::{BranchSummary, TRIGGER_KEY, WorkflowSummary};
use serde_json::Value;
use thiserror::Error;

use super::context::Context;
use super::step::StepDefinition;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised while building, committing or cataloguing workflows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// The operation is not allowed in the workflow's current state.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Structural validation failure found at commit.
    #[error("validation error: {0}")]
    Validation(String),

    /// A workflow with the same name is already registered.
    #[error("workflow '{0}' is already registered")]
    Conflict(String),

    /// No workflow is registered under the name.
    #[error("workflow '{0}' not found")]
    NotFound(String),
}

// ---------------------------------------------------------------------------
// Conditional edges
// ---------------------------------------------------------------------------

/// Predicate over the run context, evaluated after the edge's anchor step.
pub type Predicate = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Steps scheduled after `after` completes, when the predicate holds.
#[derive(Clone)]
pub struct ConditionalEdge {
    after: String,
    condition: String,
    predicate: Predicate,
    steps: Vec<StepDefinition>,
}

impl ConditionalEdge {
    pub fn after(&self) -> &str {
        &self.after
    }

    /// Human-readable description of the predicate.
    pub fn condition(&self) -> &str {
        &self.condition
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn evaluate(&self, context: &Context) -> bool {
        (self.predicate)(context)
    }

    fn summary(&self) -> BranchSummary {
        BranchSummary {
            after: self.after.clone(),
            condition: self.condition.clone(),
            steps: self.steps.iter().map(StepDefinition::summary).collect(),
        }
    }
}

impl fmt::Debug for ConditionalEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionalEdge")
            .field("after", &self.after)
            .field("condition", &self.condition)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

/// Collects the steps of a conditional branch.
#[derive(Debug, Default)]
pub struct BranchBuilder {
    steps: Vec<StepDefinition>,
}

impl BranchBuilder {
    pub fn step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A named, ordered chain of steps with optional conditional branches.
#[derive(Debug, Clone)]
pub struct Workflow {
    name: String,
    trigger_shape: Shape,
    steps: Vec<StepDefinition>,
    edges: Vec<ConditionalEdge>,
    committed: bool,
}

impl Workflow {
    pub fn new(name: impl Into<String>, trigger_shape: Shape) -> Self {
        Self {
            name: name.into(),
            trigger_shape,
            steps: Vec::new(),
            edges: Vec::new(),
            committed: false,
        }
    }

    /// Append a step to the main sequence.
    pub fn step(&mut self, step: StepDefinition) -> Result<&mut Self, WorkflowError> {
        self.ensure_open("step")?;
        self.steps.push(step);
        Ok(self)
    }

    /// Attach a conditional edge to the most recently added main step.
    ///
    /// When that step completes and `predicate` holds for the run context,
    /// the branch's steps run next, before the rest of the main sequence.
    pub fn when<P, B>(
        &mut self,
        condition: impl Into<String>,
        predicate: P,
        branch: B,
    ) -> Result<&mut Self, WorkflowError>
    where
        P: Fn(&Context) -> bool + Send + Sync + 'static,
        B: FnOnce(BranchBuilder) -> BranchBuilder,
    {
        self.ensure_open("when")?;
        let after = self
            .steps
            .last()
            .map(|s| s.id().to_string())
            .ok_or_else(|| {
                WorkflowError::IllegalState(
                    "a conditional edge needs a preceding step to attach to".to_string(),
                )
            })?;
        let steps = branch(BranchBuilder::default()).steps;
        self.edges.push(ConditionalEdge {
            after,
            condition: condition.into(),
            predicate: Arc::new(predicate),
            steps,
        });
        Ok(self)
    }

    /// Validate and freeze the workflow. Committing twice is a no-op.
    pub fn commit(&mut self) -> Result<(), WorkflowError> {
        if self.committed {
            return Ok(());
        }
        self.validate()?;
        self.committed = true;
        tracing::debug!(
            workflow = %self.name,
            steps = self.steps.len(),
            branches = self.edges.len(),
            "workflow committed"
        );
        Ok(())
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trigger_shape(&self) -> &Shape {
        &self.trigger_shape
    }

    /// Main-sequence steps in declared order.
    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    /// Conditional edges in attachment order.
    pub fn edges(&self) -> &[ConditionalEdge] {
        &self.edges
    }

    /// Edges anchored on `step_id`, in attachment order.
    pub fn edges_after<'a>(&'a self, step_id: &'a str) -> impl Iterator<Item = &'a ConditionalEdge> {
        self.edges.iter().filter(move |e| e.after == step_id)
    }

    pub fn validate_trigger(&self, input: &Value) -> Result<(), ShapeError> {
        self.trigger_shape.validate(input)
    }

    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            name: self.name.clone(),
            trigger_shape: self.trigger_shape.clone(),
            steps: self.steps.iter().map(StepDefinition::summary).collect(),
            branches: self.edges.iter().map(ConditionalEdge::summary).collect(),
        }
    }

    fn all_steps(&self) -> impl Iterator<Item = &StepDefinition> {
        self.steps
            .iter()
            .chain(self.edges.iter().flat_map(|e| e.steps.iter()))
    }

    fn ensure_open(&self, operation: &str) -> Result<(), WorkflowError> {
        if self.committed {
            return Err(WorkflowError::IllegalState(format!(
                "cannot call {operation}() on committed workflow '{}'",
                self.name
            )));
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), WorkflowError> {
        if self.name.is_empty() {
            return Err(WorkflowError::Validation(
                "workflow name must not be empty".to_string(),
            ));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(WorkflowError::Validation(format!(
                "workflow name '{}' must contain only alphanumeric characters, hyphens and underscores",
                self.name
            )));
        }
        if self.steps.is_empty() {
            return Err(WorkflowError::Validation(format!(
                "workflow '{}' has no steps",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for step in self.all_steps() {
            if step.id().is_empty() {
                return Err(WorkflowError::Validation("step id must not be empty".to_string()));
            }
            if step.id() == TRIGGER_KEY {
                return Err(WorkflowError::Validation(format!(
                    "step id '{TRIGGER_KEY}' is reserved"
                )));
            }
            if !seen.insert(step.id()) {
                return Err(WorkflowError::Validation(format!(
                    "duplicate step id '{}'",
                    step.id()
                )));
            }
        }

        for edge in &self.edges {
            if edge.steps.is_empty() {
                return Err(WorkflowError::Validation(format!(
                    "conditional edge '{}' after '{}' has no steps",
                    edge.condition, edge.after
                )));
            }
        }

        for step in self.all_steps() {
            for dep in step.required_steps() {
                if dep == step.id() {
                    return Err(WorkflowError::Validation(format!(
                        "step '{}' requires its own output",
                        step.id()
                    )));
                }
                if !seen.contains(dep.as_str()) {
                    return Err(WorkflowError::Validation(format!(
                        "step '{}' requires unknown step '{dep}'",
                        step.id()
                    )));
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
