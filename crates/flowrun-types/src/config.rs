//! Configuration types for flowrun.
//!
//! `FlowrunConfig` represents the top-level `flowrun.toml` that controls the
//! engine's step hardening, the run registry's retention, how much the
//! in-memory tools keep and the HTTP server bind address. Every field has a
//! default, so an empty file is valid.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowrunConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Step execution hardening applied by the run executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-step timeout in seconds. `0` disables the timeout.
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,

    /// Largest serialized step output accepted into a run's context.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Retry policy for transient step failures.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Capacity of the run event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_step_timeout_secs() -> u64 {
    300
}

fn default_max_output_bytes() -> usize {
    1_048_576
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: default_step_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
            retry: RetryConfig::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Bounded retry for transient step failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per step, including the first (1 = no retry).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt; doubled for each further attempt.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_backoff_ms() -> u64 {
    250
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

/// In-memory run registry settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Cap on stored runs. When set, the earliest finished runs are evicted
    /// beyond it; unset keeps every run until the process exits.
    #[serde(default)]
    pub max_retained_runs: Option<usize>,
}

/// Limits of the in-memory email outbox and draft store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Sent emails kept for inspection; the oldest are dropped first.
    #[serde(default = "default_max_sent_emails")]
    pub max_sent_emails: usize,

    /// Saved drafts kept; the oldest are dropped first.
    #[serde(default = "default_max_drafts")]
    pub max_drafts: usize,
}

fn default_max_sent_emails() -> usize {
    1000
}

fn default_max_drafts() -> usize {
    1000
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_sent_emails: default_max_sent_emails(),
            max_drafts: default_max_drafts(),
        }
    }
}

/// HTTP server bind address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4111
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}
