use crate::engine::Listener;
use crate::types::{AttemptError, CounterName, RequestInfo};
use hdrhistogram::Histogram;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

const LATENCY_LOW_MS: u64 = 1;
const LATENCY_HIGH_MS: u64 = 1_000_000;
const LATENCY_SIGFIG: u8 = 3;

/// Outcome counters and latency distribution for one scenario run.
///
/// Slots are independent atomics; the histogram sits behind a single mutex.
pub struct Counters {
    slots: [AtomicU64; CounterName::ALL.len()],
    latency_ms: Mutex<Histogram<u64>>,
}

impl Counters {
    pub fn new() -> Self {
        let histogram =
            Histogram::<u64>::new_with_bounds(LATENCY_LOW_MS, LATENCY_HIGH_MS, LATENCY_SIGFIG)
                .expect("Failed to create histogram");

        Self {
            slots: Default::default(),
            latency_ms: Mutex::new(histogram),
        }
    }

    pub fn get(&self, name: CounterName) -> u64 {
        self.slots[name.index()].load(Ordering::Relaxed)
    }

    fn inc(&self, name: CounterName) {
        self.slots[name.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .saturating_record(ms);
    }

    /// Bucket estimate in milliseconds, not an exact order statistic.
    pub fn latency_at_percentile(&self, percentile: f64) -> u64 {
        self.latency_ms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .value_at_percentile(percentile)
    }

    pub fn latency_samples(&self) -> u64 {
        self.latency_ms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for Counters {
    fn default() -> Self {
        Self::new()
    }
}

impl Listener for Counters {
    fn track_failed(&self, _info: &RequestInfo, error: &AttemptError) {
        self.inc(CounterName::Total);
        self.inc(CounterName::Failed);
        if error.is_timeout() {
            self.inc(CounterName::Timeout);
        }
    }

    fn track_response(&self, _info: &RequestInfo, success: bool, latency: Duration) {
        self.inc(CounterName::Total);
        if success {
            self.inc(CounterName::Success);
        } else {
            self.inc(CounterName::Invalid);
            self.inc(CounterName::Failed);
        }
        self.record_latency(latency);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;
    use std::sync::Arc;

    fn info() -> RequestInfo {
        RequestInfo {
            scenario: "s".to_string(),
            method: "GET".to_string(),
            url: "http://localhost".to_string(),
            code: Some("200".to_string()),
        }
    }

    #[test]
    fn test_identical_samples_give_identical_percentiles() {
        let counters = Counters::new();
        for _ in 0..1000 {
            counters.record_latency(Duration::from_millis(120));
        }
        for p in [1.0, 50.0, 90.0, 99.0, 99.9, 100.0] {
            assert_eq!(counters.latency_at_percentile(p), 120);
        }
    }

    #[test]
    fn test_latency_above_range_is_clamped() {
        let counters = Counters::new();
        counters.record_latency(Duration::from_secs(10_000));
        assert_eq!(counters.latency_samples(), 1);
        assert!(counters.latency_at_percentile(100.0) >= LATENCY_HIGH_MS);
    }

    #[test]
    fn test_outcomes_update_slots() {
        let counters = Counters::new();
        counters.track_response(&info(), true, Duration::from_millis(5));
        counters.track_response(&info(), false, Duration::from_millis(5));
        counters.track_failed(&info(), &AttemptError::new(ErrorKind::Timeout, "timed out"));
        counters.track_failed(&info(), &AttemptError::new(ErrorKind::Refused, "refused"));

        assert_eq!(counters.get(CounterName::Total), 4);
        assert_eq!(counters.get(CounterName::Success), 1);
        assert_eq!(counters.get(CounterName::Invalid), 1);
        assert_eq!(counters.get(CounterName::Failed), 3);
        assert_eq!(counters.get(CounterName::Timeout), 1);
        assert_eq!(counters.latency_samples(), 2);
    }

    #[test]
    fn test_concurrent_updates_keep_totals_consistent() {
        let counters = Arc::new(Counters::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let counters = counters.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        counters.track_response(&info(), i % 2 == 0, Duration::from_millis(3));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let total = counters.get(CounterName::Total);
        assert_eq!(total, 4000);
        assert_eq!(
            total,
            counters.get(CounterName::Success) + counters.get(CounterName::Failed)
        );
        assert_eq!(counters.latency_samples(), 4000);
    }
}
