//! Shared health state for the /health endpoint.
//! Updated by the feed poller and the snapshot intake route.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};

/// Shared health metrics. Updated by ingestion, read by API.
#[derive(Default)]
pub struct HealthState {
    /// Millisecond timestamp of the last applied poll (0 = none).
    pub last_poll_at_ms: AtomicI64,
    /// Polls that failed to fetch or parse since startup.
    pub polls_failed: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_poll(&self, at: DateTime<Utc>) {
        self.last_poll_at_ms.store(at.timestamp_millis(), Ordering::Relaxed);
    }

    pub fn record_poll_failure(&self) {
        self.polls_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_poll_at(&self) -> Option<DateTime<Utc>> {
        match self.last_poll_at_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }

    pub fn polls_failed(&self) -> u64 {
        self.polls_failed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_poll_starts_empty() {
        let h = HealthState::new();
        assert_eq!(h.last_poll_at(), None);
        let t = DateTime::from_timestamp_millis(1_767_000_000_123).unwrap();
        h.record_poll(t);
        h.record_poll_failure();
        assert_eq!(h.last_poll_at(), Some(t));
        assert_eq!(h.polls_failed(), 1);
    }
}
