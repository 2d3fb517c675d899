//! Run executor: drives runs from `pending` to `completed` or `failed`.
//!
//! Steps of a run execute strictly one at a time. After each step the
//! conditional edges anchored on it are evaluated in attachment order; the
//! steps of every edge whose predicate holds are spliced in ahead of the
//! remaining main sequence. A step error stops the run immediately.
//!
//! Every lifecycle transition is written to the [`RunRegistry`] before the
//! executor moves on, and mirrored on the [`EventBus`]. Leaving `pending`
//! and entering a terminal state go through [`RunRegistry::transition`], so
//! a run is started or cancelled exactly once and its terminal record is
//! written once.
//!
//! # Hardening
//!
//! - Each step attempt is bounded by the configured step timeout.
//! - Transient failures and timeouts are retried with exponential backoff,
//!   up to `retry.max_attempts` total attempts.
//! - [`RunExecutor::cancel`] trips the run's cancellation token; the step in
//!   flight is dropped and the run fails as cancelled.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use flowrun_types::config::EngineConfig;
use flowrun_types::event::RunEvent;
use flowrun_types::shape::ShapeError;
use flowrun_types::workflow::{FailureKind, RunFailure, RunStatus, RunStatusView};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::collab::RuntimeHandle;
use crate::event::EventBus;

use super::context::{ContextError, StepContext};
use super::definition::Workflow;
use super::registry::{RegistryError, RunFilter, RunRegistry};
use super::retry::RetryHandler;
use super::run::Run;
use super::step::{StepDefinition, StepError};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The trigger input did not match the workflow's trigger shape.
    #[error("invalid input for workflow '{workflow}': {reason}")]
    Validation { workflow: String, reason: ShapeError },

    /// The operation is not allowed in the run's or workflow's state.
    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("run not found: {0}")]
    NotFound(Uuid),

    /// The run failed in a step.
    #[error("{0}")]
    StepExecution(RunFailure),

    #[error("registry error: {0}")]
    Registry(RegistryError),
}

impl From<RegistryError> for ExecutorError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(run_id) => ExecutorError::NotFound(run_id),
            conflict @ RegistryError::Conflict { .. } => {
                ExecutorError::IllegalState(conflict.to_string())
            }
            other => ExecutorError::Registry(other),
        }
    }
}

/// How the step loop of a run ended.
enum Outcome {
    Completed {
        result: Option<Value>,
        steps_completed: u32,
    },
    Failed(RunFailure),
}

// ---------------------------------------------------------------------------
// RunExecutor
// ---------------------------------------------------------------------------

/// Creates and drives workflow runs.
///
/// Generic over `R: RunRegistry` so tests and the server can share the same
/// executor with different storage.
pub struct RunExecutor<R: RunRegistry> {
    registry: Arc<R>,
    runtime: RuntimeHandle,
    config: EngineConfig,
    step_timeout: Option<Duration>,
    event_bus: EventBus,
    /// Cancellation tokens keyed by run id, live until the run is terminal.
    cancellation_tokens: DashMap<Uuid, CancellationToken>,
}

impl<R: RunRegistry + 'static> RunExecutor<R> {
    pub fn new(registry: Arc<R>, runtime: RuntimeHandle, config: EngineConfig) -> Self {
        let step_timeout =
            (config.step_timeout_secs > 0).then(|| Duration::from_secs(config.step_timeout_secs));
        Self {
            registry,
            runtime,
            event_bus: EventBus::new(config.event_capacity),
            step_timeout,
            config,
            cancellation_tokens: DashMap::new(),
        }
    }

    /// Override the per-step timeout derived from the config.
    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<R> {
        &self.registry
    }

    pub fn runtime(&self) -> &RuntimeHandle {
        &self.runtime
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Validate the trigger and register a new `pending` run.
    pub async fn create_run(
        &self,
        workflow: &Arc<Workflow>,
        trigger: Value,
    ) -> Result<Run, ExecutorError> {
        if !workflow.is_committed() {
            return Err(ExecutorError::IllegalState(format!(
                "workflow '{}' is not committed",
                workflow.name()
            )));
        }
        workflow
            .validate_trigger(&trigger)
            .map_err(|reason| ExecutorError::Validation {
                workflow: workflow.name().to_string(),
                reason,
            })?;

        let run = Run::new(Arc::clone(workflow), trigger);
        self.registry.register(&run).await?;
        self.cancellation_tokens
            .insert(run.id(), CancellationToken::new());

        tracing::info!(run_id = %run.id(), workflow = %workflow.name(), "run created");
        Ok(run)
    }

    /// Execute a pending run to completion or failure.
    ///
    /// Step failures are not errors of this call: the returned run carries
    /// `status = failed` and the failure detail. Errors are reserved for
    /// runs that cannot start and for registry failures.
    pub async fn start(&self, mut run: Run) -> Result<Run, ExecutorError> {
        let run_id = run.id();
        if run.status() != RunStatus::Pending {
            return Err(ExecutorError::IllegalState(format!(
                "run {run_id} is {}, only pending runs can start",
                run.status()
            )));
        }

        let token = self.cancellation_tokens.entry(run_id).or_default().clone();
        if token.is_cancelled() {
            self.cancellation_tokens.remove(&run_id);
            return Err(ExecutorError::IllegalState(format!(
                "run {run_id} was cancelled before it started"
            )));
        }

        let workflow = Arc::clone(run.workflow());
        let started = Instant::now();

        run.mark_running();
        if let Err(err) = self.registry.transition(&run, RunStatus::Pending).await {
            // A concurrent start owns the token of a running run.
            if !matches!(
                err,
                RegistryError::Conflict {
                    actual: RunStatus::Running,
                    ..
                }
            ) {
                self.cancellation_tokens.remove(&run_id);
            }
            return Err(err.into());
        }
        self.event_bus.publish(RunEvent::RunStarted {
            run_id,
            workflow: workflow.name().to_string(),
        });
        tracing::info!(run_id = %run_id, workflow = %workflow.name(), "run started");

        let outcome = self.drive(&mut run, &workflow, &token).await;
        self.cancellation_tokens.remove(&run_id);

        match outcome? {
            Outcome::Completed {
                result,
                steps_completed,
            } => {
                run.mark_completed(result);
                self.registry.transition(&run, RunStatus::Running).await?;
                let duration_ms = started.elapsed().as_millis() as u64;
                self.event_bus.publish(RunEvent::RunCompleted {
                    run_id,
                    workflow: workflow.name().to_string(),
                    duration_ms,
                    steps_completed,
                });
                tracing::info!(
                    run_id = %run_id,
                    workflow = %workflow.name(),
                    steps_completed,
                    duration_ms,
                    "run completed"
                );
            }
            Outcome::Failed(failure) => {
                let message = failure.to_string();
                let step_id = failure.step_id.clone();
                run.mark_failed(failure);
                self.registry.transition(&run, RunStatus::Running).await?;
                self.event_bus.publish(RunEvent::RunFailed {
                    run_id,
                    workflow: workflow.name().to_string(),
                    step_id,
                    error: message.clone(),
                });
                tracing::error!(
                    run_id = %run_id,
                    workflow = %workflow.name(),
                    error = %message,
                    "run failed"
                );
            }
        }

        Ok(run)
    }

    /// Create a run and start it on a background task. Returns the run id
    /// immediately so callers can poll.
    pub async fn submit(
        self: &Arc<Self>,
        workflow: &Arc<Workflow>,
        trigger: Value,
    ) -> Result<Uuid, ExecutorError> {
        let run = self.create_run(workflow, trigger).await?;
        let run_id = run.id();

        let executor = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = executor.start(run).await {
                tracing::warn!(run_id = %run_id, error = %e, "run did not execute");
            }
        });

        Ok(run_id)
    }

    /// Create a run and drive it inline.
    pub async fn execute(
        &self,
        workflow: &Arc<Workflow>,
        trigger: Value,
    ) -> Result<Run, ExecutorError> {
        let run = self.create_run(workflow, trigger).await?;
        self.start(run).await
    }

    /// Request cancellation of a pending or running run.
    ///
    /// A pending run fails immediately. A running run fails as soon as its
    /// current step is interrupted. If the run starts while the request is in
    /// flight, the step loop records the cancellation instead.
    pub async fn cancel(&self, run_id: Uuid) -> Result<(), ExecutorError> {
        let mut run = self.registry.get(&run_id).await?;
        if run.status().is_terminal() {
            return Err(ExecutorError::IllegalState(format!(
                "run {run_id} is already {}",
                run.status()
            )));
        }

        if let Some(token) = self.cancellation_tokens.get(&run_id) {
            token.cancel();
        }

        if run.status() == RunStatus::Pending {
            const MESSAGE: &str = "run cancelled before it started";
            run.mark_failed(RunFailure {
                step_id: None,
                kind: FailureKind::Cancelled,
                message: MESSAGE.to_string(),
                attempts: 0,
            });
            match self.registry.transition(&run, RunStatus::Pending).await {
                Ok(()) => {
                    self.cancellation_tokens.remove(&run_id);
                    self.event_bus.publish(RunEvent::RunFailed {
                        run_id,
                        workflow: run.workflow_name().to_string(),
                        step_id: None,
                        error: MESSAGE.to_string(),
                    });
                }
                // Started in the meantime; the tripped token fails it.
                Err(RegistryError::Conflict {
                    actual: RunStatus::Running,
                    ..
                }) => {}
                Err(err) => return Err(err.into()),
            }
        }

        tracing::info!(run_id = %run_id, "run cancellation requested");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn get(&self, run_id: Uuid) -> Result<Run, ExecutorError> {
        Ok(self.registry.get(&run_id).await?)
    }

    pub async fn status(&self, run_id: Uuid) -> Result<RunStatusView, ExecutorError> {
        Ok(self.get(run_id).await?.view())
    }

    pub async fn list(&self, filter: &RunFilter) -> Result<Vec<RunStatusView>, ExecutorError> {
        let runs = self.registry.list(filter).await?;
        Ok(runs.iter().map(Run::view).collect())
    }

    // -----------------------------------------------------------------------
    // Step loop
    // -----------------------------------------------------------------------

    async fn drive(
        &self,
        run: &mut Run,
        workflow: &Workflow,
        token: &CancellationToken,
    ) -> Result<Outcome, ExecutorError> {
        let run_id = run.id();
        let mut queue: VecDeque<&StepDefinition> = workflow.steps().iter().collect();
        let mut steps_completed = 0u32;

        while let Some(step) = queue.pop_front() {
            run.current_step = Some(step.id().to_string());
            self.registry.register(run).await?;

            if let Err(failure) = self.run_step(run, step, token).await {
                return Ok(Outcome::Failed(failure));
            }
            steps_completed += 1;

            let mut scheduled = Vec::new();
            for edge in workflow.edges_after(step.id()) {
                if edge.evaluate(run.context()) {
                    let ids: Vec<String> = edge.steps().iter().map(|s| s.id().to_string()).collect();
                    tracing::debug!(
                        run_id = %run_id,
                        after_step = %step.id(),
                        condition = %edge.condition(),
                        "branch taken"
                    );
                    self.event_bus.publish(RunEvent::BranchTaken {
                        run_id,
                        after_step: step.id().to_string(),
                        condition: edge.condition().to_string(),
                        steps: ids,
                    });
                    scheduled.extend(edge.steps());
                } else {
                    tracing::debug!(
                        run_id = %run_id,
                        after_step = %step.id(),
                        condition = %edge.condition(),
                        "branch skipped"
                    );
                }
            }
            for branch_step in scheduled.into_iter().rev() {
                queue.push_front(branch_step);
            }
        }

        let result = run
            .current_step()
            .and_then(|id| run.context().get(id))
            .cloned();
        Ok(Outcome::Completed {
            result,
            steps_completed,
        })
    }

    /// Execute one step with retry, and record its output in the context.
    async fn run_step(
        &self,
        run: &mut Run,
        step: &StepDefinition,
        token: &CancellationToken,
    ) -> Result<(), RunFailure> {
        let run_id = run.id();
        let ctx = StepContext::new(run_id, run.workflow_name(), step, run.context());

        if let Err(violation) = step.input_shape().validate(ctx.input()) {
            let err = StepError::InvalidInput(violation);
            self.publish_step_failed(run_id, step, &err, false);
            return Err(step_failure(step, &err, 0));
        }

        let mut attempt = 1;
        loop {
            self.event_bus.publish(RunEvent::StepStarted {
                run_id,
                step_id: step.id().to_string(),
                attempt,
            });
            tracing::debug!(run_id = %run_id, step_id = %step.id(), attempt, "executing step");

            let started = Instant::now();
            match self.invoke(step, ctx.clone(), token).await {
                Ok(output) => {
                    run.context
                        .insert_with_limit(step.id(), output, self.config.max_output_bytes)
                        .map_err(|e| {
                            let kind = match e {
                                ContextError::OutputTooLarge { .. } => FailureKind::OutputTooLarge,
                                _ => FailureKind::StepExecution,
                            };
                            RunFailure {
                                step_id: Some(step.id().to_string()),
                                kind,
                                message: e.to_string(),
                                attempts: attempt,
                            }
                        })?;

                    let duration_ms = started.elapsed().as_millis() as u64;
                    self.event_bus.publish(RunEvent::StepCompleted {
                        run_id,
                        step_id: step.id().to_string(),
                        duration_ms,
                    });
                    tracing::info!(
                        run_id = %run_id,
                        step_id = %step.id(),
                        duration_ms,
                        "step completed"
                    );
                    return Ok(());
                }
                Err(err) => {
                    let will_retry = RetryHandler::should_retry(&self.config.retry, attempt, &err);
                    self.publish_step_failed(run_id, step, &err, will_retry);
                    tracing::warn!(
                        run_id = %run_id,
                        step_id = %step.id(),
                        attempt,
                        will_retry,
                        error = %err,
                        "step attempt failed"
                    );
                    if !will_retry {
                        return Err(step_failure(step, &err, attempt));
                    }

                    let delay = RetryHandler::backoff(&self.config.retry, attempt);
                    tokio::select! {
                        _ = token.cancelled() => {
                            return Err(step_failure(step, &StepError::Cancelled, attempt));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// One attempt of a step body, bounded by the timeout and the run's
    /// cancellation token.
    async fn invoke(
        &self,
        step: &StepDefinition,
        ctx: StepContext,
        token: &CancellationToken,
    ) -> Result<Value, StepError> {
        let body = step.body().execute_boxed(ctx, self.runtime.clone());
        let bounded = async {
            match self.step_timeout {
                Some(limit) => match tokio::time::timeout(limit, body).await {
                    Ok(result) => result,
                    Err(_) => Err(StepError::Timeout(limit)),
                },
                None => body.await,
            }
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(StepError::Cancelled),
            result = bounded => result,
        }
    }

    fn publish_step_failed(&self, run_id: Uuid, step: &StepDefinition, err: &StepError, will_retry: bool) {
        self.event_bus.publish(RunEvent::StepFailed {
            run_id,
            step_id: step.id().to_string(),
            error: err.to_string(),
            will_retry,
        });
    }
}

fn step_failure(step: &StepDefinition, err: &StepError, attempts: u32) -> RunFailure {
    RunFailure {
        step_id: Some(step.id().to_string()),
        kind: err.failure_kind(),
        message: err.to_string(),
        attempts,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use flowrun_types::config::RetryConfig;
    use flowrun_types::shape::{FieldKind, Shape};
    use serde::Deserialize;
    use serde_json::json;

    use crate::workflow::registry::InMemoryRunRegistry;

    type TestExecutor = RunExecutor<InMemoryRunRegistry>;

    #[derive(Deserialize)]
    struct AOut {
        y: i64,
    }

    #[derive(Deserialize)]
    struct BOut {
        z: i64,
    }

    fn engine_with(config: EngineConfig) -> Arc<TestExecutor> {
        Arc::new(RunExecutor::new(
            Arc::new(InMemoryRunRegistry::default()),
            RuntimeHandle::default(),
            config,
        ))
    }

    fn engine() -> Arc<TestExecutor> {
        engine_with(EngineConfig::default())
    }

    fn committed(mut wf: Workflow) -> Arc<Workflow> {
        wf.commit().unwrap();
        Arc::new(wf)
    }

    fn noop(id: &str) -> StepDefinition {
        let id_owned = id.to_string();
        StepDefinition::from_fn(id, move |_ctx, _rt| {
            let id = id_owned.clone();
            async move { Ok(json!({ "ran": id })) }
        })
    }

    /// `[A, B, C]` where A yields `{y: 2}`, B doubles y (or fails), C marks done.
    fn abc(fail_b: bool) -> Arc<Workflow> {
        let mut wf = Workflow::new("abc", Shape::object().field("x", FieldKind::Integer, "seed"));
        wf.step(StepDefinition::from_fn("A", |_ctx, _rt| async {
            Ok(json!({ "y": 2 }))
        }))
        .unwrap()
        .step(
            StepDefinition::from_fn("B", move |ctx: StepContext, _rt| async move {
                if fail_b {
                    return Err(StepError::failed("boom"));
                }
                let a: AOut = ctx.get("A")?;
                Ok(json!({ "z": a.y * 2 }))
            })
            .requires(["A"]),
        )
        .unwrap()
        .step(
            StepDefinition::from_fn("C", |ctx: StepContext, _rt| async move {
                let b: BOut = ctx.get("B")?;
                Ok(json!({ "done": b.z == 4 }))
            })
            .requires(["B"]),
        )
        .unwrap();
        committed(wf)
    }

    /// `A` echoes trigger `y`; edge `A.y > 1` schedules `D`; then `E`.
    fn branching() -> Arc<Workflow> {
        let mut wf = Workflow::new("branching", Shape::any());
        wf.step(StepDefinition::from_fn("A", |ctx: StepContext, _rt| async move {
            let y: i64 = ctx.trigger_field("y")?;
            Ok(json!({ "y": y }))
        }))
        .unwrap()
        .when(
            "A.y > 1",
            |ctx| ctx.get("A").and_then(|a| a["y"].as_i64()).unwrap_or(0) > 1,
            |b| b.step(noop("D")),
        )
        .unwrap()
        .step(noop("E"))
        .unwrap();
        committed(wf)
    }

    async fn wait_for(
        exec: &TestExecutor,
        run_id: Uuid,
        predicate: impl Fn(&RunStatusView) -> bool,
    ) -> RunStatusView {
        for _ in 0..300 {
            let view = exec.status(run_id).await.unwrap();
            if predicate(&view) {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run {run_id} never reached the expected state");
    }

    fn keys(run: &Run) -> Vec<String> {
        run.context().keys().map(str::to_string).collect()
    }

    // -- End-to-end ----------------------------------------------------------

    #[tokio::test]
    async fn linear_run_completes_with_all_outputs() {
        let exec = engine();
        let run = exec.execute(&abc(false), json!({ "x": 1 })).await.unwrap();

        assert_eq!(run.status(), RunStatus::Completed);
        assert_eq!(run.result(), Some(&json!({ "done": true })));
        assert_eq!(
            run.context().to_json(),
            json!({
                "trigger": { "x": 1 },
                "A": { "y": 2 },
                "B": { "z": 4 },
                "C": { "done": true },
            })
        );
        assert!(run.error().is_none());
        assert!(run.completed_at().is_some());
        assert_eq!(run.outcome().unwrap(), Some(&json!({ "done": true })));
    }

    #[tokio::test]
    async fn failing_step_stops_the_run() {
        let exec = engine();
        let run = exec.execute(&abc(true), json!({ "x": 1 })).await.unwrap();

        assert_eq!(run.status(), RunStatus::Failed);
        assert_eq!(run.current_step(), Some("B"));
        assert_eq!(
            run.context().to_json(),
            json!({ "trigger": { "x": 1 }, "A": { "y": 2 } })
        );
        let failure = run.error().unwrap();
        assert!(failure.message.contains("boom"));
        assert_eq!(failure.step_id.as_deref(), Some("B"));
        assert_eq!(failure.kind, FailureKind::StepExecution);
        assert!(run.result().is_none());
        assert!(matches!(run.outcome(), Err(ExecutorError::StepExecution(_))));

        let stored = exec.status(run.id()).await.unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.current_step.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn unknown_run_is_not_found() {
        let exec = engine();
        let missing = Uuid::now_v7();
        assert!(matches!(
            exec.status(missing).await,
            Err(ExecutorError::NotFound(id)) if id == missing
        ));
    }

    #[tokio::test]
    async fn branch_runs_only_when_predicate_holds() {
        let exec = engine();
        let wf = branching();

        let taken = exec.execute(&wf, json!({ "y": 2 })).await.unwrap();
        assert_eq!(taken.status(), RunStatus::Completed);
        assert_eq!(keys(&taken), vec!["trigger", "A", "D", "E"]);

        let skipped = exec.execute(&wf, json!({ "y": 0 })).await.unwrap();
        assert_eq!(skipped.status(), RunStatus::Completed);
        assert_eq!(keys(&skipped), vec!["trigger", "A", "E"]);

        let again = exec.execute(&wf, json!({ "y": 2 })).await.unwrap();
        assert_eq!(keys(&again), keys(&taken));
    }

    #[tokio::test]
    async fn branches_are_spliced_in_attachment_order() {
        let mut wf = Workflow::new("multi", Shape::any());
        wf.step(noop("A"))
            .unwrap()
            .when("first", |_| true, |b| b.step(noop("X1")).step(noop("X2")))
            .unwrap()
            .when("second", |_| true, |b| b.step(noop("Y")))
            .unwrap()
            .when("never", |_| false, |b| b.step(noop("Z")))
            .unwrap()
            .step(noop("B"))
            .unwrap();
        let run = engine().execute(&committed(wf), json!({})).await.unwrap();

        assert_eq!(keys(&run), vec!["trigger", "A", "X1", "X2", "Y", "B"]);
        assert_eq!(run.result(), Some(&json!({ "ran": "B" })));
    }

    #[tokio::test]
    async fn completed_context_has_one_key_per_step() {
        let exec = engine();
        for n in 1..=5 {
            let mut wf = Workflow::new(format!("linear-{n}"), Shape::any());
            for i in 0..n {
                wf.step(noop(&format!("s{i}"))).unwrap();
            }
            let run = exec.execute(&committed(wf), json!({})).await.unwrap();
            assert_eq!(run.status(), RunStatus::Completed);
            assert_eq!(run.context().len(), n + 1);
        }
    }

    #[tokio::test]
    async fn runs_do_not_share_context() {
        let exec = engine();
        let wf = branching();

        let first = exec.create_run(&wf, json!({ "y": 5 })).await.unwrap();
        let second = exec.create_run(&wf, json!({ "y": 0 })).await.unwrap();
        let first = exec.start(first).await.unwrap();
        let second = exec.start(second).await.unwrap();

        assert_ne!(first.id(), second.id());
        assert_eq!(first.context().get("A").unwrap()["y"], 5);
        assert_eq!(second.context().get("A").unwrap()["y"], 0);
        assert!(first.context().contains("D"));
        assert!(!second.context().contains("D"));
    }

    // -- Lifecycle guards ------------------------------------------------------

    #[tokio::test]
    async fn invalid_trigger_creates_no_run() {
        let exec = engine();
        let err = exec
            .create_run(&abc(false), json!({ "x": "one" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Validation { .. }));
        assert!(err.to_string().contains("'x'"));
        assert!(exec.registry().is_empty());
    }

    #[tokio::test]
    async fn uncommitted_workflow_cannot_run() {
        let mut wf = Workflow::new("draft", Shape::any());
        wf.step(noop("A")).unwrap();
        let err = engine().create_run(&Arc::new(wf), json!({})).await.unwrap_err();
        assert!(matches!(err, ExecutorError::IllegalState(_)));
    }

    #[tokio::test]
    async fn only_pending_runs_start() {
        let exec = engine();
        let run = exec.create_run(&abc(false), json!({ "x": 1 })).await.unwrap();
        let stale_copy = run.clone();

        let finished = exec.start(run).await.unwrap();
        assert!(matches!(
            exec.start(finished).await,
            Err(ExecutorError::IllegalState(_))
        ));
        assert!(matches!(
            exec.start(stale_copy).await,
            Err(ExecutorError::IllegalState(_))
        ));
    }

    #[tokio::test]
    async fn submit_returns_immediately_and_run_completes() {
        let exec = engine();
        let run_id = exec.submit(&abc(false), json!({ "x": 1 })).await.unwrap();

        let view = wait_for(&exec, run_id, |v| v.status.is_terminal()).await;
        assert_eq!(view.status, RunStatus::Completed);
        assert_eq!(view.current_step.as_deref(), Some("C"));
        assert_eq!(view.result, Some(json!({ "done": true })));
    }

    // -- Step hardening --------------------------------------------------------

    #[tokio::test]
    async fn input_shape_violation_fails_the_step() {
        let mut wf = Workflow::new("shaped", Shape::any());
        wf.step(noop("A"))
            .unwrap()
            .step(
                noop("B")
                    .requires(["A"])
                    .input(Shape::object().field("missing", FieldKind::String, "never produced")),
            )
            .unwrap();
        let run = engine().execute(&committed(wf), json!({})).await.unwrap();

        assert_eq!(run.status(), RunStatus::Failed);
        let failure = run.error().unwrap();
        assert_eq!(failure.kind, FailureKind::InvalidInput);
        assert_eq!(failure.attempts, 0);
        assert!(failure.message.contains("missing"));
        assert!(!run.context().contains("B"));
    }

    #[tokio::test]
    async fn undeclared_read_fails_the_step() {
        let mut wf = Workflow::new("sneaky", Shape::any());
        wf.step(noop("A"))
            .unwrap()
            .step(StepDefinition::from_fn("B", |ctx: StepContext, _rt| async move {
                let a = ctx.raw("A")?.clone();
                Ok(a)
            }))
            .unwrap();
        let run = engine().execute(&committed(wf), json!({})).await.unwrap();

        assert_eq!(run.status(), RunStatus::Failed);
        assert!(run.error().unwrap().message.contains("not declared"));
    }

    #[tokio::test]
    async fn slow_step_times_out() {
        let mut wf = Workflow::new("slow", Shape::any());
        wf.step(StepDefinition::from_fn("nap", |_ctx, _rt| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!({}))
        }))
        .unwrap();
        let exec = RunExecutor::new(
            Arc::new(InMemoryRunRegistry::default()),
            RuntimeHandle::default(),
            EngineConfig::default(),
        )
        .with_step_timeout(Some(Duration::from_millis(20)));

        let run = exec.execute(&committed(wf), json!({})).await.unwrap();
        assert_eq!(run.status(), RunStatus::Failed);
        assert_eq!(run.error().unwrap().kind, FailureKind::Timeout);
    }

    fn flaky(failures: u32, calls: Arc<AtomicU32>) -> Arc<Workflow> {
        let mut wf = Workflow::new("flaky", Shape::any());
        wf.step(StepDefinition::from_fn("flaky", move |_ctx, _rt| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n <= failures {
                    Err(StepError::Transient(format!("attempt {n} unavailable")))
                } else {
                    Ok(json!({ "attempt": n }))
                }
            }
        }))
        .unwrap();
        committed(wf)
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let exec = engine_with(EngineConfig {
            retry: RetryConfig {
                max_attempts: 3,
                backoff_ms: 1,
            },
            ..EngineConfig::default()
        });

        let run = exec
            .execute(&flaky(2, Arc::clone(&calls)), json!({}))
            .await
            .unwrap();
        assert_eq!(run.status(), RunStatus::Completed);
        assert_eq!(run.result(), Some(&json!({ "attempt": 3 })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_is_disabled_by_default() {
        let calls = Arc::new(AtomicU32::new(0));
        let run = engine()
            .execute(&flaky(1, Arc::clone(&calls)), json!({}))
            .await
            .unwrap();
        assert_eq!(run.status(), RunStatus::Failed);
        assert_eq!(run.error().unwrap().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn oversized_output_fails_the_run() {
        let mut wf = Workflow::new("big", Shape::any());
        wf.step(StepDefinition::from_fn("blob", |_ctx, _rt| async {
            Ok(json!({ "data": "x".repeat(256) }))
        }))
        .unwrap();
        let exec = engine_with(EngineConfig {
            max_output_bytes: 64,
            ..EngineConfig::default()
        });

        let run = exec.execute(&committed(wf), json!({})).await.unwrap();
        assert_eq!(run.status(), RunStatus::Failed);
        assert_eq!(run.error().unwrap().kind, FailureKind::OutputTooLarge);
        assert!(!run.context().contains("blob"));
    }

    // -- Cancellation ----------------------------------------------------------

    #[tokio::test]
    async fn cancel_interrupts_running_step() {
        let mut wf = Workflow::new("long", Shape::any());
        wf.step(StepDefinition::from_fn("wait", |_ctx, _rt| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(json!({}))
        }))
        .unwrap()
        .step(noop("after"))
        .unwrap();
        let exec = engine();
        let run_id = exec.submit(&committed(wf), json!({})).await.unwrap();

        wait_for(&exec, run_id, |v| v.status == RunStatus::Running).await;
        exec.cancel(run_id).await.unwrap();

        let view = wait_for(&exec, run_id, |v| v.status.is_terminal()).await;
        assert_eq!(view.status, RunStatus::Failed);
        let failure = view.error.unwrap();
        assert_eq!(failure.kind, FailureKind::Cancelled);
        assert_eq!(failure.step_id.as_deref(), Some("wait"));
    }

    #[tokio::test]
    async fn cancel_pending_run_prevents_start() {
        let exec = engine();
        let run = exec.create_run(&abc(false), json!({ "x": 1 })).await.unwrap();
        let run_id = run.id();

        exec.cancel(run_id).await.unwrap();
        let view = exec.status(run_id).await.unwrap();
        assert_eq!(view.status, RunStatus::Failed);
        assert_eq!(view.error.unwrap().kind, FailureKind::Cancelled);

        assert!(matches!(
            exec.start(run).await,
            Err(ExecutorError::IllegalState(_))
        ));
    }

    #[tokio::test]
    async fn cancel_terminal_run_is_illegal() {
        let exec = engine();
        let run = exec.execute(&abc(false), json!({ "x": 1 })).await.unwrap();
        assert!(matches!(
            exec.cancel(run.id()).await,
            Err(ExecutorError::IllegalState(_))
        ));
        assert!(matches!(
            exec.cancel(Uuid::now_v7()).await,
            Err(ExecutorError::NotFound(_))
        ));
    }

    /// Registry whose first write of a running run yields for a while,
    /// like a round trip to durable storage.
    #[derive(Default)]
    struct SlowStartRegistry {
        inner: InMemoryRunRegistry,
        delayed: AtomicBool,
    }

    impl RunRegistry for SlowStartRegistry {
        async fn register(&self, run: &Run) -> Result<(), RegistryError> {
            self.inner.register(run).await
        }

        async fn transition(&self, run: &Run, from: RunStatus) -> Result<(), RegistryError> {
            if run.status() == RunStatus::Running && !self.delayed.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.inner.transition(run, from).await
        }

        async fn get(&self, run_id: &Uuid) -> Result<Run, RegistryError> {
            self.inner.get(run_id).await
        }

        async fn list(&self, filter: &RunFilter) -> Result<Vec<Run>, RegistryError> {
            self.inner.list(filter).await
        }

        async fn remove(&self, run_id: &Uuid) -> Result<bool, RegistryError> {
            self.inner.remove(run_id).await
        }
    }

    #[tokio::test]
    async fn cancel_while_start_is_writing_records_one_failure() {
        let mut wf = Workflow::new("slow-start", Shape::any());
        wf.step(StepDefinition::from_fn("wait", |_ctx, _rt| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(json!({}))
        }))
        .unwrap();
        let wf = committed(wf);
        let exec = Arc::new(RunExecutor::new(
            Arc::new(SlowStartRegistry::default()),
            RuntimeHandle::default(),
            EngineConfig::default(),
        ));
        let mut rx = exec.event_bus().subscribe();

        let run_id = exec.submit(&wf, json!({})).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        exec.cancel(run_id).await.unwrap();

        let first = exec.status(run_id).await.unwrap();
        assert_eq!(first.status, RunStatus::Failed);
        for _ in 0..30 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert_eq!(exec.status(run_id).await.unwrap(), first);
        }

        let failure = first.error.clone().unwrap();
        assert_eq!(failure.kind, FailureKind::Cancelled);
        assert_eq!(failure.step_id, None);

        let (mut started, mut failed) = (0, 0);
        while let Ok(event) = rx.try_recv() {
            match event {
                RunEvent::RunStarted { .. } => started += 1,
                RunEvent::RunFailed { .. } => failed += 1,
                _ => {}
            }
        }
        assert_eq!(started, 0);
        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn second_start_of_same_run_is_rejected() {
        let mut wf = Workflow::new("long", Shape::any());
        wf.step(StepDefinition::from_fn("wait", |_ctx, _rt| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(json!({}))
        }))
        .unwrap();
        let exec = engine();
        let run = exec.create_run(&committed(wf), json!({})).await.unwrap();
        let run_id = run.id();
        let copy = run.clone();

        let runner = Arc::clone(&exec);
        tokio::spawn(async move { runner.start(run).await });
        wait_for(&exec, run_id, |v| v.status == RunStatus::Running).await;

        assert!(matches!(
            exec.start(copy).await,
            Err(ExecutorError::IllegalState(_))
        ));

        // The first start still owns its cancellation token.
        exec.cancel(run_id).await.unwrap();
        let view = wait_for(&exec, run_id, |v| v.status.is_terminal()).await;
        assert_eq!(view.error.unwrap().step_id.as_deref(), Some("wait"));
    }

    // -- Events and listing ----------------------------------------------------

    #[tokio::test]
    async fn lifecycle_events_are_published() {
        let exec = engine();
        let mut rx = exec.event_bus().subscribe();
        let run = exec.execute(&branching(), json!({ "y": 3 })).await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.run_id(), run.id());
            events.push(event);
        }

        assert!(matches!(events.first(), Some(RunEvent::RunStarted { .. })));
        assert!(matches!(
            events.last(),
            Some(RunEvent::RunCompleted { steps_completed: 3, .. })
        ));
        let completed = events
            .iter()
            .filter(|e| matches!(e, RunEvent::StepCompleted { .. }))
            .count();
        assert_eq!(completed, 3);
        assert!(events.iter().any(|e| matches!(
            e,
            RunEvent::BranchTaken { after_step, .. } if after_step == "A"
        )));
    }

    #[tokio::test]
    async fn list_filters_by_workflow_and_status() {
        let exec = engine();
        exec.execute(&abc(false), json!({ "x": 1 })).await.unwrap();
        exec.execute(&abc(true), json!({ "x": 1 })).await.unwrap();
        exec.execute(&branching(), json!({ "y": 0 })).await.unwrap();

        let abc_runs = exec
            .list(&RunFilter {
                workflow: Some("abc".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(abc_runs.len(), 2);

        let failed = exec
            .list(&RunFilter {
                status: Some(RunStatus::Failed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].current_step.as_deref(), Some("B"));
    }
}
