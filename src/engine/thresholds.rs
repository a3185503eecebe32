use crate::engine::Counters;
use crate::types::{CheckKind, Threshold};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Tally {
    passed: u64,
    total: u64,
}

/// Pass/total per check type for one scenario run.
#[derive(Debug, Default)]
pub struct CheckCounters {
    tallies: Mutex<HashMap<CheckKind, Tally>>,
}

impl CheckCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: CheckKind, pass: bool) {
        let mut tallies = self.tallies.lock().unwrap_or_else(PoisonError::into_inner);
        let tally = tallies.entry(kind).or_default();
        tally.total += 1;
        if pass {
            tally.passed += 1;
        }
    }

    fn tally(&self, kind: CheckKind) -> Tally {
        self.tallies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .copied()
            .unwrap_or_default()
    }

    pub fn passed(&self, kind: CheckKind) -> u64 {
        self.tally(kind).passed
    }

    pub fn total(&self, kind: CheckKind) -> u64 {
        self.tally(kind).total
    }

    /// `passed / total`, or 0 when nothing was checked.
    pub fn rate(&self, kind: CheckKind) -> f64 {
        let tally = self.tally(kind);
        if tally.total == 0 {
            0.0
        } else {
            tally.passed as f64 / tally.total as f64
        }
    }
}

/// Identifies one scenario run in a [`ThresholdRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(u64);

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// Check counters keyed by run, so same-named scenarios can run side by side.
#[derive(Debug, Default)]
pub struct ThresholdRegistry {
    next: AtomicU64,
    runs: Mutex<HashMap<RunId, Arc<CheckCounters>>>,
}

impl ThresholdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> (RunId, Arc<CheckCounters>) {
        let id = RunId(self.next.fetch_add(1, Ordering::Relaxed));
        let counters = Arc::new(CheckCounters::new());
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, counters.clone());
        (id, counters)
    }

    pub fn take(&self, id: RunId) -> Option<Arc<CheckCounters>> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    pub fn discard(&self, id: RunId) {
        self.take(id);
    }

    pub fn len(&self) -> usize {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumes the run's counters. A run that was never registered (or
    /// was already evaluated) fails.
    pub fn evaluate(
        &self,
        id: RunId,
        scenario: &str,
        thresholds: &[Threshold],
        counters: &Counters,
    ) -> ThresholdReport {
        match self.take(id) {
            Some(checks) => evaluate_thresholds(scenario, thresholds, &checks, counters),
            None => {
                tracing::error!(scenario, run = %id, "no check counters registered for run");
                ThresholdReport {
                    passed: false,
                    outcomes: Vec::new(),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdOutcome {
    pub metric: &'static str,
    pub condition: String,
    pub actual: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdReport {
    pub passed: bool,
    pub outcomes: Vec<ThresholdOutcome>,
}

impl Default for ThresholdReport {
    fn default() -> Self {
        Self {
            passed: true,
            outcomes: Vec::new(),
        }
    }
}

pub fn evaluate_thresholds(
    scenario: &str,
    thresholds: &[Threshold],
    checks: &CheckCounters,
    counters: &Counters,
) -> ThresholdReport {
    let outcomes: Vec<ThresholdOutcome> = thresholds
        .iter()
        .map(|t| evaluate_threshold(t, checks, counters))
        .collect();

    for outcome in &outcomes {
        if outcome.passed {
            tracing::debug!(
                scenario,
                metric = outcome.metric,
                condition = %outcome.condition,
                actual = outcome.actual,
                "threshold passed"
            );
        } else {
            tracing::error!(
                scenario,
                metric = outcome.metric,
                condition = %outcome.condition,
                actual = outcome.actual,
                "threshold failed"
            );
        }
    }

    ThresholdReport {
        passed: outcomes.iter().all(|o| o.passed),
        outcomes,
    }
}

fn evaluate_threshold(
    threshold: &Threshold,
    checks: &CheckCounters,
    counters: &Counters,
) -> ThresholdOutcome {
    match threshold {
        Threshold::Checks {
            kind,
            min_rate,
            max_rate,
            min_count,
            max_count,
        } => {
            let rate = checks.rate(*kind);
            let passed_count = checks.passed(*kind);

            let mut passed = true;
            let mut condition = format!("{} pass rate", kind);
            if let Some(min) = min_rate {
                passed &= rate >= *min;
                let _ = write!(condition, " >= {}", min);
            }
            if let Some(max) = max_rate {
                passed &= rate <= *max;
                let _ = write!(condition, " <= {}", max);
            }
            if let Some(min) = min_count {
                passed &= passed_count >= *min;
                let _ = write!(condition, ", passed >= {}", min);
            }
            if let Some(max) = max_count {
                passed &= passed_count <= *max;
                let _ = write!(condition, ", passed <= {}", max);
            }

            ThresholdOutcome {
                metric: threshold.metric(),
                condition,
                actual: rate,
                passed,
            }
        }
        Threshold::Latency {
            percentile,
            min_value,
            max_value,
        } => {
            let actual = counters.latency_at_percentile(*percentile) as f64;

            let mut passed = true;
            let mut condition = format!("p{} latency", percentile);
            if let Some(min) = min_value {
                passed &= actual >= *min;
                let _ = write!(condition, " >= {}ms", min);
            }
            if let Some(max) = max_value {
                passed &= actual <= *max;
                let _ = write!(condition, " <= {}ms", max);
            }

            ThresholdOutcome {
                metric: threshold.metric(),
                condition,
                actual,
                passed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn code_rate(min_rate: f64) -> Threshold {
        Threshold::Checks {
            kind: CheckKind::Code,
            min_rate: Some(min_rate),
            max_rate: None,
            min_count: None,
            max_count: None,
        }
    }

    fn tally(passed: u64, failed: u64) -> CheckCounters {
        let checks = CheckCounters::new();
        for _ in 0..passed {
            checks.record(CheckKind::Code, true);
        }
        for _ in 0..failed {
            checks.record(CheckKind::Code, false);
        }
        checks
    }

    #[test]
    fn test_all_checks_passing_meets_min_rate() {
        let report = evaluate_thresholds("s", &[code_rate(1.0)], &tally(10, 0), &Counters::new());
        assert!(report.passed);
        assert_eq!(report.outcomes[0].actual, 1.0);
    }

    #[test]
    fn test_one_failure_misses_min_rate() {
        let report = evaluate_thresholds("s", &[code_rate(1.0)], &tally(9, 1), &Counters::new());
        assert!(!report.passed);
        assert!((report.outcomes[0].actual - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_total_is_rate_zero() {
        let checks = CheckCounters::new();
        assert_eq!(checks.rate(CheckKind::Body), 0.0);
        let report = evaluate_thresholds("s", &[code_rate(0.5)], &checks, &Counters::new());
        assert!(!report.passed);
    }

    #[test]
    fn test_count_bounds() {
        let threshold = Threshold::Checks {
            kind: CheckKind::Code,
            min_rate: None,
            max_rate: Some(1.0),
            min_count: Some(5),
            max_count: Some(8),
        };
        let counters = Counters::new();
        assert!(!evaluate_thresholds("s", &[threshold.clone()], &tally(4, 0), &counters).passed);
        assert!(evaluate_thresholds("s", &[threshold.clone()], &tally(6, 2), &counters).passed);
        assert!(!evaluate_thresholds("s", &[threshold], &tally(9, 0), &counters).passed);
    }

    #[test]
    fn test_latency_threshold() {
        let counters = Counters::new();
        for _ in 0..100 {
            counters.record_latency(Duration::from_millis(250));
        }
        let threshold = |max: f64| Threshold::Latency {
            percentile: 99.0,
            min_value: None,
            max_value: Some(max),
        };
        let checks = CheckCounters::new();
        assert!(evaluate_thresholds("s", &[threshold(300.0)], &checks, &counters).passed);
        assert!(!evaluate_thresholds("s", &[threshold(200.0)], &checks, &counters).passed);
    }

    #[test]
    fn test_no_thresholds_pass() {
        let report = evaluate_thresholds("s", &[], &CheckCounters::new(), &Counters::new());
        assert!(report.passed);
        assert!(report.outcomes.is_empty());
    }

    #[test]
    fn test_registry_keys_by_run_not_name() {
        let registry = ThresholdRegistry::new();
        let (first, first_checks) = registry.register();
        let (second, second_checks) = registry.register();
        assert_ne!(first, second);

        first_checks.record(CheckKind::Code, true);
        second_checks.record(CheckKind::Code, false);

        let counters = Counters::new();
        assert!(registry.evaluate(first, "same", &[code_rate(1.0)], &counters).passed);
        assert!(!registry.evaluate(second, "same", &[code_rate(1.0)], &counters).passed);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_missing_run_fails() {
        let registry = ThresholdRegistry::new();
        let (id, _) = registry.register();
        registry.discard(id);
        let report = registry.evaluate(id, "gone", &[], &Counters::new());
        assert!(!report.passed);
    }
}
