//! Request handlers, grouped by resource.

pub mod inspect;
pub mod run;
pub mod workflow;
