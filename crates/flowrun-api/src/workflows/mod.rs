//! Demo workflows served by the `flowrun` binary, and the collaborators they
//! call.

pub mod business_card;
pub mod requirements;

use flowrun_core::collab::RuntimeHandle;
use flowrun_core::workflow::{WorkflowCatalog, WorkflowError};
use flowrun_infra::tool::{NoteStoreTool, OutboxTool};

/// Build, commit and register every demo workflow.
pub fn register_all(catalog: &WorkflowCatalog) -> Result<(), WorkflowError> {
    catalog.register(requirements::build()?)?;
    catalog.register(business_card::build()?)?;
    Ok(())
}

/// Runtime handle with the agents and tools the demo workflows look up.
pub fn demo_runtime(outbox: OutboxTool, notes: NoteStoreTool) -> RuntimeHandle {
    RuntimeHandle::builder()
        .agent(requirements::analyst_agent())
        .agent(requirements::spec_writer_agent())
        .agent(business_card::email_writer_agent())
        .tool(outbox)
        .tool(notes)
        .build()
}
