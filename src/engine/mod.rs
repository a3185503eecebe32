mod counters;
mod executor;
mod generator;
mod listener;
mod runner;
mod stats;
mod thresholds;
mod worker;

pub use counters::Counters;
pub use executor::execute;
pub use generator::{GeneratorExit, GeneratorReport, RateGenerator};
pub use listener::Listener;
pub use runner::{RunReport, Runner};
pub use stats::{ScenarioStats, ScenarioStatus, Stats};
pub use thresholds::{
    CheckCounters, RunId, ThresholdOutcome, ThresholdRegistry, ThresholdReport,
    evaluate_thresholds,
};
pub use worker::{Attempt, WorkerPool};
