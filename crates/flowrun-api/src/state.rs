//! Application state shared by CLI commands and REST handlers.

use std::sync::Arc;

use flowrun_core::workflow::{InMemoryRunRegistry, RunExecutor, WorkflowCatalog};
use flowrun_infra::tool::{NoteStoreTool, OutboxTool};
use flowrun_types::config::FlowrunConfig;

use crate::workflows;

/// Executor pinned to the in-memory registry.
pub type ConcreteExecutor = RunExecutor<InMemoryRunRegistry>;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<WorkflowCatalog>,
    pub executor: Arc<ConcreteExecutor>,
    pub outbox: OutboxTool,
    pub notes: NoteStoreTool,
    pub config: Arc<FlowrunConfig>,
}

impl AppState {
    /// Wire the catalog, collaborators and executor from `config`.
    pub fn init(config: FlowrunConfig) -> anyhow::Result<Self> {
        let catalog = WorkflowCatalog::new();
        workflows::register_all(&catalog)?;

        let outbox = OutboxTool::with_capacity(config.tools.max_sent_emails);
        let notes = NoteStoreTool::with_capacity(config.tools.max_drafts);
        let runtime = workflows::demo_runtime(outbox.clone(), notes.clone());

        let registry = Arc::new(match config.registry.max_retained_runs {
            Some(limit) => InMemoryRunRegistry::with_retention(limit),
            None => InMemoryRunRegistry::new(),
        });
        let executor = RunExecutor::new(registry, runtime, config.engine.clone());

        tracing::debug!(
            workflows = catalog.len(),
            step_timeout_secs = config.engine.step_timeout_secs,
            max_attempts = config.engine.retry.max_attempts,
            "application state initialized"
        );

        Ok(Self {
            catalog: Arc::new(catalog),
            executor: Arc::new(executor),
            outbox,
            notes,
            config: Arc::new(config),
        })
    }
}
