//! Shared domain types for flowrun.
//!
//! This crate contains the serializable types used across the workflow
//! engine, its collaborators and the HTTP surface: run status, input shapes,
//! run events, collaborator messages and configuration.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod event;
pub mod llm;
pub mod shape;
pub mod tool;
pub mod workflow;
