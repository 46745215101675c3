use std::time::Duration;

/// Window after which an anomaly stops being visible.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Construction-time settings shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSettings {
    pub ttl: Duration,
}

impl StoreSettings {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl }
    }

    /// TTL in whole milliseconds, saturating at `i64::MAX`.
    pub fn ttl_millis(&self) -> i64 {
        i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX)
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL }
    }
}
