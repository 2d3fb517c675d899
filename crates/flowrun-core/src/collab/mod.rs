//! Collaborator contracts used by step bodies.
//!
//! Steps never construct LLM clients or side-effecting services themselves.
//! They receive a [`RuntimeHandle`] and look collaborators up by name:
//! - [`Agent`]: produces a text reply from an ordered list of chat messages.
//! - [`Tool`]: performs a side effect on a JSON input matching its shape.
//!
//! Both traits use RPITIT and are wrapped in `Box*` types for dynamic
//! dispatch, the same way LLM providers are boxed elsewhere in the stack.

pub mod agent;
pub mod runtime;
pub mod tool;

pub use agent::{Agent, AgentDyn, BoxAgent};
pub use runtime::{RuntimeBuilder, RuntimeHandle};
pub use tool::{BoxTool, Tool, ToolDyn};
