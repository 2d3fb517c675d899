//! HTTP/REST API layer for flowrun.
//!
//! Axum router exposing workflow submission and run status polling under
//! `/api`, with CORS and request tracing.

pub mod error;
pub mod handlers;
pub mod router;
