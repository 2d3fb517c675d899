//! In-memory tool implementations.
//!
//! Both tools record their side effects in process memory and expose them
//! for inspection, standing in for an email gateway and a document store.

pub mod notes;
pub mod outbox;

pub use notes::{NoteDraft, NoteStoreTool};
pub use outbox::{OutboxTool, SentEmail};
