//! Run registry: where the executor records run state for pollers.
//!
//! The trait uses RPITIT so a persistent backend can be slotted in later;
//! [`InMemoryRunRegistry`] is the process-local implementation.
//!
//! A run that reached `completed` or `failed` is never overwritten: both
//! [`RunRegistry::register`] and [`RunRegistry::transition`] reject the write
//! with [`RegistryError::Conflict`].

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use flowrun_types::workflow::RunStatus;
use thiserror::Error;
use uuid::Uuid;

use super::run::Run;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("run not found: {0}")]
    NotFound(Uuid),

    /// The stored run is not in the state the write expected.
    #[error("run {run_id} is {actual}, expected {expected}")]
    Conflict {
        run_id: Uuid,
        expected: String,
        actual: RunStatus,
    },

    #[error("storage error: {0}")]
    Storage(String),
}

/// Optional filters for [`RunRegistry::list`].
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub workflow: Option<String>,
    pub status: Option<RunStatus>,
    pub limit: Option<usize>,
}

/// Storage for run state, keyed by run id.
pub trait RunRegistry: Send + Sync {
    /// Insert or replace the stored state of a non-terminal run.
    fn register(&self, run: &Run) -> impl Future<Output = Result<(), RegistryError>> + Send;

    /// Replace the stored run only if its status is still `from`.
    ///
    /// The status check and the write happen atomically, so two callers
    /// racing to move a run out of the same state cannot both succeed.
    fn transition(
        &self,
        run: &Run,
        from: RunStatus,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send;

    /// Snapshot of a run's current state.
    fn get(&self, run_id: &Uuid) -> impl Future<Output = Result<Run, RegistryError>> + Send;

    /// Runs matching `filter`, newest first.
    fn list(&self, filter: &RunFilter) -> impl Future<Output = Result<Vec<Run>, RegistryError>> + Send;

    /// Drop a run. Returns whether it existed.
    fn remove(&self, run_id: &Uuid) -> impl Future<Output = Result<bool, RegistryError>> + Send;
}

/// Process-local registry backed by a `DashMap`.
///
/// Runs are kept until the process exits. With a retention limit set, the
/// runs that became terminal earliest are evicted once more than
/// `max_retained_runs` runs are stored; pending and running runs are never
/// evicted.
#[derive(Debug, Default)]
pub struct InMemoryRunRegistry {
    runs: DashMap<Uuid, Run>,
    max_retained_runs: Option<usize>,
    /// Terminal run ids in the order they finished. Only kept with a limit.
    terminal_order: Mutex<VecDeque<Uuid>>,
}

impl InMemoryRunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evict finished runs beyond `max_retained_runs` (at least 1).
    pub fn with_retention(max_retained_runs: usize) -> Self {
        Self {
            max_retained_runs: Some(max_retained_runs.max(1)),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Record that `run_id` just became terminal and trim the overflow.
    fn finished(&self, run_id: Uuid) {
        let Some(limit) = self.max_retained_runs else {
            return;
        };

        let mut order = self
            .terminal_order
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        order.push_back(run_id);
        while self.runs.len() > limit {
            let Some(oldest) = order.pop_front() else {
                break;
            };
            if self.runs.remove(&oldest).is_some() {
                tracing::debug!(run_id = %oldest, "evicted terminal run from registry");
            }
        }
    }
}

impl RunRegistry for InMemoryRunRegistry {
    async fn register(&self, run: &Run) -> Result<(), RegistryError> {
        match self.runs.entry(run.id()) {
            Entry::Occupied(mut entry) => {
                let actual = entry.get().status();
                if actual.is_terminal() {
                    return Err(RegistryError::Conflict {
                        run_id: run.id(),
                        expected: "a non-terminal run".to_string(),
                        actual,
                    });
                }
                entry.insert(run.clone());
            }
            Entry::Vacant(entry) => {
                entry.insert(run.clone());
            }
        }

        if run.status().is_terminal() {
            self.finished(run.id());
        }
        Ok(())
    }

    async fn transition(&self, run: &Run, from: RunStatus) -> Result<(), RegistryError> {
        {
            let mut stored = self
                .runs
                .get_mut(&run.id())
                .ok_or(RegistryError::NotFound(run.id()))?;
            let actual = stored.status();
            if actual != from {
                return Err(RegistryError::Conflict {
                    run_id: run.id(),
                    expected: from.to_string(),
                    actual,
                });
            }
            *stored = run.clone();
        }

        if run.status().is_terminal() && !from.is_terminal() {
            self.finished(run.id());
        }
        Ok(())
    }

    async fn get(&self, run_id: &Uuid) -> Result<Run, RegistryError> {
        self.runs
            .get(run_id)
            .map(|entry| entry.value().clone())
            .ok_or(RegistryError::NotFound(*run_id))
    }

    async fn list(&self, filter: &RunFilter) -> Result<Vec<Run>, RegistryError> {
        let mut runs: Vec<Run> = self
            .runs
            .iter()
            .filter(|e| {
                let run = e.value();
                filter
                    .workflow
                    .as_deref()
                    .is_none_or(|name| run.workflow_name() == name)
                    && filter.status.is_none_or(|status| run.status() == status)
            })
            .map(|e| e.value().clone())
            .collect();
        runs.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then(b.id().cmp(&a.id())));
        if let Some(limit) = filter.limit {
            runs.truncate(limit);
        }
        Ok(runs)
    }

    async fn remove(&self, run_id: &Uuid) -> Result<bool, RegistryError> {
        Ok(self.runs.remove(run_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::workflow::definition::Workflow;
    use crate::workflow::step::StepDefinition;
    use flowrun_types::shape::Shape;
    use flowrun_types::workflow::{FailureKind, RunFailure};
    use serde_json::json;

    fn workflow(name: &str) -> Arc<Workflow> {
        let mut wf = Workflow::new(name, Shape::any());
        wf.step(StepDefinition::from_fn("A", |_ctx, _rt| async { Ok(json!({})) }))
            .unwrap();
        wf.commit().unwrap();
        Arc::new(wf)
    }

    fn completed(wf: &Arc<Workflow>) -> Run {
        let mut run = Run::new(Arc::clone(wf), json!({}));
        run.mark_running();
        run.mark_completed(Some(json!({ "ok": true })));
        run
    }

    #[tokio::test]
    async fn register_get_remove() {
        let registry = InMemoryRunRegistry::default();
        let run = Run::new(workflow("wf"), json!({ "x": 1 }));

        registry.register(&run).await.unwrap();
        let stored = registry.get(&run.id()).await.unwrap();
        assert_eq!(stored.status(), RunStatus::Pending);
        assert_eq!(stored.context().trigger()["x"], 1);

        assert!(registry.remove(&run.id()).await.unwrap());
        assert!(!registry.remove(&run.id()).await.unwrap());
        assert_eq!(
            registry.get(&run.id()).await.unwrap_err(),
            RegistryError::NotFound(run.id())
        );
    }

    #[tokio::test]
    async fn register_replaces_state() {
        let registry = InMemoryRunRegistry::default();
        let mut run = Run::new(workflow("wf"), json!({}));
        registry.register(&run).await.unwrap();

        run.mark_running();
        registry.register(&run).await.unwrap();
        assert_eq!(registry.get(&run.id()).await.unwrap().status(), RunStatus::Running);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn runs_are_isolated() {
        let registry = InMemoryRunRegistry::default();
        let wf = workflow("wf");
        let mut first = Run::new(Arc::clone(&wf), json!({ "n": 1 }));
        let second = Run::new(Arc::clone(&wf), json!({ "n": 2 }));
        assert_ne!(first.id(), second.id());

        first.context.insert("A", json!({ "mine": true })).unwrap();
        registry.register(&first).await.unwrap();
        registry.register(&second).await.unwrap();

        let second = registry.get(&second.id()).await.unwrap();
        assert!(!second.context().contains("A"));
        assert_eq!(second.context().trigger()["n"], 2);
    }

    #[tokio::test]
    async fn list_filters_and_orders_newest_first() {
        let registry = InMemoryRunRegistry::default();
        let alpha = workflow("alpha");
        let beta = workflow("beta");

        let old = completed(&alpha);
        let pending = Run::new(Arc::clone(&alpha), json!({}));
        let mut failed = Run::new(Arc::clone(&beta), json!({}));
        failed.mark_failed(RunFailure {
            step_id: Some("A".to_string()),
            kind: FailureKind::StepExecution,
            message: "boom".to_string(),
            attempts: 1,
        });
        for run in [&old, &pending, &failed] {
            registry.register(run).await.unwrap();
        }

        let all = registry.list(&RunFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id(), failed.id());
        assert_eq!(all[2].id(), old.id());

        let alpha_runs = registry
            .list(&RunFilter {
                workflow: Some("alpha".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(alpha_runs.len(), 2);

        let failed_runs = registry
            .list(&RunFilter {
                status: Some(RunStatus::Failed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(failed_runs.len(), 1);
        assert_eq!(failed_runs[0].workflow_name(), "beta");

        let limited = registry
            .list(&RunFilter {
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn retention_evicts_earliest_finished_and_keeps_active_runs() {
        let registry = InMemoryRunRegistry::with_retention(2);
        let wf = workflow("wf");

        let oldest = completed(&wf);
        let active = Run::new(Arc::clone(&wf), json!({}));
        let newer = completed(&wf);
        let newest = completed(&wf);
        for run in [&oldest, &active, &newer, &newest] {
            registry.register(run).await.unwrap();
        }

        assert_eq!(registry.len(), 2);
        assert!(registry.get(&active.id()).await.is_ok());
        assert!(registry.get(&newest.id()).await.is_ok());
        assert!(registry.get(&oldest.id()).await.is_err());
    }

    #[tokio::test]
    async fn runs_are_kept_without_a_retention_limit() {
        let registry = InMemoryRunRegistry::default();
        let wf = workflow("wf");

        let first = completed(&wf);
        registry.register(&first).await.unwrap();
        for _ in 0..600 {
            registry.register(&completed(&wf)).await.unwrap();
        }

        assert_eq!(registry.len(), 601);
        assert_eq!(registry.get(&first.id()).await.unwrap().id(), first.id());
    }

    #[tokio::test]
    async fn transition_requires_expected_status() {
        let registry = InMemoryRunRegistry::default();
        let mut run = Run::new(workflow("wf"), json!({}));
        registry.register(&run).await.unwrap();

        let mut cancelled = run.clone();
        cancelled.mark_failed(RunFailure {
            step_id: None,
            kind: FailureKind::Cancelled,
            message: "run cancelled before it started".to_string(),
            attempts: 0,
        });
        registry
            .transition(&cancelled, RunStatus::Pending)
            .await
            .unwrap();

        run.mark_running();
        let err = registry
            .transition(&run, RunStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Conflict {
                actual: RunStatus::Failed,
                ..
            }
        ));
        assert_eq!(
            registry.get(&run.id()).await.unwrap().status(),
            RunStatus::Failed
        );

        let unknown = Run::new(workflow("wf"), json!({}));
        assert_eq!(
            registry
                .transition(&unknown, RunStatus::Pending)
                .await
                .unwrap_err(),
            RegistryError::NotFound(unknown.id())
        );
    }

    #[tokio::test]
    async fn terminal_runs_are_not_overwritten() {
        let registry = InMemoryRunRegistry::default();
        let wf = workflow("wf");
        let done = completed(&wf);
        registry.register(&done).await.unwrap();

        let mut rewritten = done.clone();
        rewritten.mark_failed(RunFailure {
            step_id: Some("A".to_string()),
            kind: FailureKind::StepExecution,
            message: "late".to_string(),
            attempts: 1,
        });
        assert!(matches!(
            registry.register(&rewritten).await,
            Err(RegistryError::Conflict { .. })
        ));
        assert_eq!(
            registry.get(&done.id()).await.unwrap().status(),
            RunStatus::Completed
        );
    }
}
