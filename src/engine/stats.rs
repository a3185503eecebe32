use crate::engine::Counters;
use crate::engine::thresholds::ThresholdReport;
use crate::types::CounterName;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioStatus {
    Completed,
    Cancelled,
    Failed(String),
}

/// Final record of one scenario run.
pub struct ScenarioStats {
    pub name: String,
    pub counters: Arc<Counters>,
    pub duration: Duration,
    pub thresholds: ThresholdReport,
    pub status: ScenarioStatus,
}

impl ScenarioStats {
    /// Completed and every threshold held.
    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Completed && self.thresholds.passed
    }

    pub fn counter(&self, name: CounterName) -> u64 {
        self.counters.get(name)
    }

    pub fn latency_at_percentile(&self, percentile: f64) -> u64 {
        self.counters.latency_at_percentile(percentile)
    }

    /// Attempts per second of wall-clock time, rounded.
    pub fn rps(&self) -> u64 {
        let secs = self.duration.as_secs_f64();
        if secs <= 0.0 {
            return 0;
        }
        let attempts = self.counter(CounterName::Success) + self.counter(CounterName::Failed);
        (attempts as f64 / secs).round() as u64
    }
}

/// Per-scenario results of a plan, in plan order.
#[derive(Default)]
pub struct Stats {
    scenarios: Vec<ScenarioStats>,
    cancelled: bool,
    elapsed: Duration,
}

impl Stats {
    /// `elapsed` is the wall-clock time of the whole plan.
    pub fn new(scenarios: Vec<ScenarioStats>, cancelled: bool, elapsed: Duration) -> Self {
        Self {
            scenarios,
            cancelled,
            elapsed,
        }
    }

    pub fn scenarios(&self) -> &[ScenarioStats] {
        &self.scenarios
    }

    pub fn scenario(&self, name: &str) -> Option<&ScenarioStats> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    pub fn counter(&self, scenario: &str, name: CounterName) -> Option<u64> {
        self.scenario(scenario).map(|s| s.counter(name))
    }

    pub fn latency_at_percentile(&self, scenario: &str, percentile: f64) -> Option<u64> {
        self.scenario(scenario)
            .map(|s| s.latency_at_percentile(percentile))
    }

    pub fn passed(&self, scenario: &str) -> Option<bool> {
        self.scenario(scenario).map(ScenarioStats::passed)
    }

    pub fn rps(&self, scenario: &str) -> Option<u64> {
        self.scenario(scenario).map(ScenarioStats::rps)
    }

    pub fn duration(&self, scenario: &str) -> Option<Duration> {
        self.scenario(scenario).map(|s| s.duration)
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    /// False when cancelled, even if every recorded scenario passed.
    pub fn all_passed(&self) -> bool {
        !self.cancelled && self.scenarios.iter().all(ScenarioStats::passed)
    }

    pub fn total_duration(&self) -> Duration {
        self.elapsed
    }
}
