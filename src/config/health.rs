// ABOUTME: Health verification settings for the freshly launched instance.
// ABOUTME: Settle delay, bounded attempts, probe timeout and log capture size.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct HealthSettings {
    /// HTTP path probed on the published host port.
    #[serde(default = "default_path")]
    pub path: String,

    /// Wait before the first probe so the process can bind its listener.
    #[serde(default = "default_settle_delay", with = "humantime_serde")]
    pub settle_delay: Duration,

    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_probe_timeout", with = "humantime_serde")]
    pub probe_timeout: Duration,

    /// Log lines captured from the instance when every probe failed.
    #[serde(default = "default_log_tail")]
    pub log_tail: u64,
}

fn default_path() -> String {
    "/_stcore/health".to_string()
}

fn default_settle_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_max_attempts() -> u32 {
    12
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_log_tail() -> u64 {
    50
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            path: default_path(),
            settle_delay: default_settle_delay(),
            interval: default_interval(),
            max_attempts: default_max_attempts(),
            probe_timeout: default_probe_timeout(),
            log_tail: default_log_tail(),
        }
    }
}

impl HealthSettings {
    /// Upper bound on the time spent in the verify stage.
    pub fn worst_case(&self) -> Duration {
        self.settle_delay + (self.interval + self.probe_timeout) * self.max_attempts
    }
}
