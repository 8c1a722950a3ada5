//! Channel adapter configuration.

use serde::Deserialize;

fn default_thread_name() -> String {
    "qlink-worker".to_string()
}

/// Settings applied when a channel adapter brings up a worker.
///
/// `log_level` is forwarded in the init handshake and gates the
/// worker's [`LogContext`](qlink_core::LogContext): 0 silent through
/// 5 trace.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub log_level: u8,
    /// Name given to the dedicated worker thread, where one exists.
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            log_level: 0,
            thread_name: default_thread_name(),
        }
    }
}
