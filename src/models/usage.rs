use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One slice of foreground-application telemetry produced by the native tracker.
///
/// Field names on the wire follow the backend's usage-buffering contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageSample {
    #[serde(rename = "app")]
    pub application: String,
    /// Seconds spent in `application` since the previous sample.
    #[serde(rename = "duration")]
    pub active_duration: u64,
    /// Seconds of accumulated idle time at the moment of sampling.
    pub idle_duration: u64,
    pub timestamp: DateTime<Utc>,
}

impl UsageSample {
    pub fn is_idle(&self) -> bool {
        self.idle_duration > 0
    }
}
