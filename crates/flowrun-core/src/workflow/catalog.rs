//! Name-indexed set of committed workflows.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use flowrun_types::workflow::WorkflowSummary;

use super::definition::{Workflow, WorkflowError};

/// Registry of committed workflows, keyed by workflow name.
#[derive(Debug, Default)]
pub struct WorkflowCatalog {
    workflows: DashMap<String, Arc<Workflow>>,
}

impl WorkflowCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a committed workflow.
    pub fn register(&self, workflow: Workflow) -> Result<Arc<Workflow>, WorkflowError> {
        if !workflow.is_committed() {
            return Err(WorkflowError::IllegalState(format!(
                "workflow '{}' must be committed before it is registered",
                workflow.name()
            )));
        }
        match self.workflows.entry(workflow.name().to_string()) {
            Entry::Occupied(entry) => Err(WorkflowError::Conflict(entry.key().clone())),
            Entry::Vacant(entry) => {
                let workflow = Arc::new(workflow);
                entry.insert(Arc::clone(&workflow));
                tracing::info!(workflow = %workflow.name(), "workflow registered");
                Ok(workflow)
            }
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<Workflow>, WorkflowError> {
        self.workflows
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| WorkflowError::NotFound(name.to_string()))
    }

    /// Registered workflow names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workflows.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Summaries of every registered workflow, sorted by name.
    pub fn summaries(&self) -> Vec<WorkflowSummary> {
        let mut summaries: Vec<WorkflowSummary> =
            self.workflows.iter().map(|e| e.value().summary()).collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}
