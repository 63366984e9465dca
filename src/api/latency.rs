//! Ranking-pass timing. Every handler and recorder pass that grades the
//! active set records its duration here; /stats/latency reads it back.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;
use serde::Serialize;

/// Percentiles in microseconds. All None until the first sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LatencySummary {
    pub samples: u64,
    pub p50_us: Option<u64>,
    pub p95_us: Option<u64>,
    pub p99_us: Option<u64>,
    pub max_us: Option<u64>,
}

pub struct LatencyStats {
    inner: Mutex<Histogram<u64>>,
}

impl LatencyStats {
    /// 1us to 100s, 3 significant figures.
    pub fn new() -> Self {
        let histogram =
            Histogram::new_with_bounds(1, 100_000_000, 3).expect("valid histogram bounds");
        Self {
            inner: Mutex::new(histogram),
        }
    }

    pub fn record(&self, d: Duration) {
        let us = d.as_micros().clamp(1, 100_000_000) as u64;
        if let Ok(mut h) = self.inner.lock() {
            let _ = h.record(us);
        }
    }

    /// Run `f`, recording how long it took.
    pub fn time<T>(&self, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let out = f();
        self.record(started.elapsed());
        out
    }

    pub fn summary(&self) -> LatencySummary {
        let Ok(h) = self.inner.lock() else {
            return LatencySummary::default();
        };
        if h.len() == 0 {
            return LatencySummary::default();
        }
        LatencySummary {
            samples: h.len(),
            p50_us: Some(h.value_at_quantile(0.5)),
            p95_us: Some(h.value_at_quantile(0.95)),
            p99_us: Some(h.value_at_quantile(0.99)),
            max_us: Some(h.max()),
        }
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_until_first_sample() {
        let stats = LatencyStats::new();
        assert_eq!(stats.summary(), LatencySummary::default());

        let answer = stats.time(|| 42);
        assert_eq!(answer, 42);
        assert_eq!(stats.summary().samples, 1);
    }

    #[test]
    fn percentiles_are_ordered() {
        let stats = LatencyStats::new();
        for us in 1..=100 {
            stats.record(Duration::from_micros(us * 10));
        }
        let s = stats.summary();
        assert_eq!(s.samples, 100);
        assert!(s.p50_us <= s.p95_us && s.p95_us <= s.p99_us && s.p99_us <= s.max_us);
        assert!((495..=505).contains(&s.p50_us.unwrap()));
    }
}
