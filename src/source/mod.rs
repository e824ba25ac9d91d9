pub mod http;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Look-back window ending at `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub to: DateTime<Utc>,
    pub window_size_ms: u64,
}

impl TimeWindow {
    pub fn ending_now(window_size_ms: u64) -> Self {
        Self {
            to: Utc::now(),
            window_size_ms,
        }
    }

    /// Window end in whole seconds, expressed as epoch milliseconds.
    pub fn to_epoch_ms(&self) -> i64 {
        self.to.timestamp() * 1000
    }
}

/// Where alerts come from.
pub trait AlertSource {
    fn fetch_events(&self, window: &TimeWindow) -> Result<Vec<Value>>;
}
