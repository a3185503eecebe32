use crate::engine::Listener;
use crate::engine::generator::{GeneratorExit, RateGenerator};
use crate::engine::thresholds::{RunId, ThresholdRegistry};
use crate::engine::worker::{Attempt, WorkerPool};
use crate::error::RunError;
use crate::types::{Scenario, Segment};
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: RunId,
    pub tickets: u64,
    pub duration: Duration,
}

/// Drives one scenario through its segments: generator, bounded queue,
/// worker pool, listeners.
pub struct Runner {
    client: Client,
    scenario: Arc<Scenario>,
    listeners: Arc<[Arc<dyn Listener>]>,
}

impl Runner {
    pub fn new(client: Client, scenario: Arc<Scenario>, listeners: Vec<Arc<dyn Listener>>) -> Self {
        Self {
            client,
            scenario,
            listeners: Arc::from(listeners),
        }
    }

    /// Registers the run's check counters in `registry` and leaves them
    /// there on success for threshold evaluation.
    pub async fn run(
        &self,
        registry: &ThresholdRegistry,
        cancel: &CancellationToken,
    ) -> Result<RunReport, RunError> {
        let (run_id, check_counters) = registry.register();
        let attempt = Arc::new(Attempt::new(
            self.scenario.clone(),
            self.client.clone(),
            self.listeners.clone(),
            check_counters,
        ));

        let segments = self.scenario.segments();
        tracing::info!(
            scenario = %self.scenario.name,
            segments = segments.len(),
            planned = %humantime::format_duration(self.scenario.total_duration()),
            max_threads = self.scenario.max_threads(),
            "starting scenario"
        );

        let start = Instant::now();
        let mut tickets = 0;

        for segment in segments {
            match self.run_segment(&segment, attempt.clone(), cancel).await {
                Ok(emitted) => tickets += emitted,
                Err(e) => {
                    registry.discard(run_id);
                    return Err(e);
                }
            }
        }

        let duration = start.elapsed();
        tracing::info!(
            scenario = %self.scenario.name,
            tickets,
            duration_ms = duration.as_millis() as u64,
            "scenario finished"
        );

        Ok(RunReport {
            run_id,
            tickets,
            duration,
        })
    }

    async fn run_segment(
        &self,
        segment: &Segment,
        attempt: Arc<Attempt>,
        cancel: &CancellationToken,
    ) -> Result<u64, RunError> {
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }

        tracing::info!(
            scenario = %self.scenario.name,
            stage = %segment.name,
            start_rps = segment.start_rps,
            target_rps = segment.target_rps,
            threads = segment.threads,
            duration = %humantime::format_duration(segment.duration),
            "starting stage"
        );

        let (queue_tx, queue_rx) = mpsc::channel(segment.threads as usize);
        let stop = CancellationToken::new();

        let generator = RateGenerator::new(segment.duration, segment.start_rps, segment.target_rps);
        let generator = tokio::spawn(generator.run(queue_tx, stop.clone(), cancel.clone()));

        let pool = WorkerPool::new(segment.threads, attempt);
        let pooled = pool.run(queue_rx, stop, cancel.clone()).await;
        let report = generator.await?;

        pooled?;
        if report.exit == GeneratorExit::Cancelled {
            return Err(RunError::Cancelled);
        }

        Ok(report.emitted)
    }
}
