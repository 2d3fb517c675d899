//! Workflow engine: definitions, run context, execution and run storage.
//!
//! - `step` -- step body contract and step definitions
//! - `context` -- append-only run context and the per-step read view
//! - `definition` -- workflow builder, conditional edges, commit validation
//! - `catalog` -- committed workflows by name
//! - `run` -- run state and its status view
//! - `registry` -- run storage trait and the in-memory implementation
//! - `retry` -- retry policy for transient step failures
//! - `executor` -- drives runs through their lifecycle

pub mod catalog;
pub mod context;
pub mod definition;
pub mod executor;
pub mod registry;
pub mod retry;
pub mod run;
pub mod step;

pub use catalog::WorkflowCatalog;
pub use context::{Context, ContextError, StepContext};
pub use definition::{BranchBuilder, ConditionalEdge, Workflow, WorkflowError};
pub use executor::{ExecutorError, RunExecutor};
pub use registry::{InMemoryRunRegistry, RegistryError, RunFilter, RunRegistry};
pub use retry::RetryHandler;
pub use run::Run;
pub use step::{Executable, ExecutableDyn, FnStep, StepDefinition, StepError};
