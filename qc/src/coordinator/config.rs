//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// What happens to a query that is still in flight when shutdown is requested
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShutdownPolicy {
    /// Fail every queued callback immediately and stop
    #[default]
    Abandon,
    /// Wait for the in-flight query, deliver its outcome, then stop
    Drain,
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Channel buffer size for external requests
    #[serde(rename = "channel-buffer", default = "default_channel_buffer")]
    pub channel_buffer: usize,

    /// Upper bound on how long the preparation hook may take before the cycle
    /// is failed. `None` waits forever.
    #[serde(rename = "preparation-timeout-ms", default)]
    pub preparation_timeout_ms: Option<u64>,

    /// Shutdown behavior for an in-flight query
    #[serde(default)]
    pub shutdown: ShutdownPolicy,
}

fn default_channel_buffer() -> usize {
    debug!("default_channel_buffer: called");
    256
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        debug!("CoordinatorConfig::default: called");
        Self {
            channel_buffer: 256,
            preparation_timeout_ms: None,
            shutdown: ShutdownPolicy::Abandon,
        }
    }
}

impl CoordinatorConfig {
    /// Get the preparation timeout as a Duration, if one is configured
    pub fn preparation_timeout(&self) -> Option<Duration> {
        debug!(preparation_timeout_ms = ?self.preparation_timeout_ms, "CoordinatorConfig::preparation_timeout: called");
        self.preparation_timeout_ms.map(Duration::from_millis)
    }
}
