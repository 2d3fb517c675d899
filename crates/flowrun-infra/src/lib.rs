//! Infrastructure for flowrun: configuration loading and the in-process
//! collaborators the demo service registers with the engine.
//!
//! - [`config`] reads `flowrun.toml`.
//! - [`agent::ScriptedAgent`] is a deterministic, rule-driven [`Agent`].
//! - [`tool::OutboxTool`] and [`tool::NoteStoreTool`] record side effects in
//!   memory instead of calling external services.
//!
//! [`Agent`]: flowrun_core::collab::Agent

pub mod agent;
pub mod config;
pub mod tool;
