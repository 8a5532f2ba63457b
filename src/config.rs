use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration for the streaming cache.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Seconds without access before an idle session is evicted.
    pub idle_timeout_secs: u64,
    /// Seconds between idle sweep passes.
    pub sweep_interval_secs: u64,
    /// Directory holding descriptor files and their JSON sidecars.
    pub descriptor_dir: String,
}

impl StreamConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 30 * 60,
            sweep_interval_secs: 10 * 60,
            descriptor_dir: "./torrents".to_string(),
        }
    }
}
