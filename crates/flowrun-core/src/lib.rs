//! Workflow engine for flowrun.
//!
//! A [`workflow::Workflow`] is an ordered chain of steps with optional
//! conditional branches. Committed workflows are executed as runs by the
//! [`workflow::RunExecutor`], which records every lifecycle transition in a
//! [`workflow::RunRegistry`] so callers can poll progress.
//!
//! Steps reach LLM agents and side-effecting tools through the contracts in
//! [`collab`]; concrete implementations live in `flowrun-infra`.

pub mod collab;
pub mod event;
pub mod workflow;
