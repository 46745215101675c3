//! Wall-clock source used for TTL decisions.
//!
//! Backends take an injected [`Clock`] instead of calling `Utc::now()`
//! directly so expiry boundaries can be tested deterministically.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard = to;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        let next = ChronoDuration::from_std(by)
            .ok()
            .and_then(|step| guard.checked_add_signed(step))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        *guard = next;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// `now - created_at >= ttl`. Entries stamped in the future never expire early.
pub fn is_expired(created_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    let elapsed = now.signed_duration_since(created_at);
    if elapsed < ChronoDuration::zero() {
        return false;
    }
    match elapsed.to_std() {
        Ok(elapsed) => elapsed >= ttl,
        Err(_) => false,
    }
}
