//! Configuration loader for flowrun.
//!
//! Reads `flowrun.toml` and deserializes it into [`FlowrunConfig`]. Falls back
//! to defaults when the file is missing or malformed, so a bad config never
//! keeps the service from starting.

use std::path::{Path, PathBuf};

use flowrun_types::config::FlowrunConfig;

/// File name looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "flowrun.toml";

/// Smallest accepted run event channel capacity.
const MIN_EVENT_CAPACITY: usize = 16;

/// Resolve the config path: an explicit path wins, else `./flowrun.toml`.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Load configuration from `path`.
///
/// - If the file does not exist, returns [`FlowrunConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - Otherwise returns the parsed config with floors applied (see [`normalize`]).
pub async fn load_config(path: &Path) -> FlowrunConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return FlowrunConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return FlowrunConfig::default();
        }
    };

    match toml::from_str::<FlowrunConfig>(&content) {
        Ok(config) => {
            tracing::debug!("Loaded config from {}", path.display());
            normalize(config)
        }
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            FlowrunConfig::default()
        }
    }
}

/// Clamp values that would make the engine unusable.
///
/// `retry.max_attempts`, a set `registry.max_retained_runs` and the tool
/// store limits are at least 1; the event channel holds at least 16 events.
pub fn normalize(mut config: FlowrunConfig) -> FlowrunConfig {
    config.engine.retry.max_attempts = config.engine.retry.max_attempts.max(1);
    config.engine.event_capacity = config.engine.event_capacity.max(MIN_EVENT_CAPACITY);
    config.registry.max_retained_runs = config.registry.max_retained_runs.map(|n| n.max(1));
    config.tools.max_sent_emails = config.tools.max_sent_emails.max(1);
    config.tools.max_drafts = config.tools.max_drafts.max(1);
    config
}
