use crate::engine::runner::Runner;
use crate::engine::stats::{ScenarioStats, ScenarioStatus, Stats};
use crate::engine::thresholds::{ThresholdRegistry, ThresholdReport};
use crate::engine::{Counters, Listener};
use crate::error::RunError;
use crate::http::create_client;
use crate::types::{HttpClientConfig, Plan, Scenario};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Runs every scenario of `plan`, in order or all at once when the plan
/// is parallel. Each scenario reports to a fresh [`Counters`] followed by
/// `extra` listeners.
pub async fn execute(
    plan: &Plan,
    extra: &[Arc<dyn Listener>],
    cancel: &CancellationToken,
) -> Stats {
    tracing::info!(
        plan = %plan.name,
        scenarios = plan.scenarios.len(),
        parallel = plan.parallel,
        "executing plan"
    );

    let start = Instant::now();
    let registry = Arc::new(ThresholdRegistry::new());
    let scenarios = if plan.parallel {
        execute_parallel(plan, extra, &registry, cancel).await
    } else {
        execute_sequential(plan, extra, &registry, cancel).await
    };

    let cancelled = cancel.is_cancelled()
        || scenarios
            .iter()
            .any(|s| s.status == ScenarioStatus::Cancelled);

    Stats::new(scenarios, cancelled, start.elapsed())
}

async fn execute_sequential(
    plan: &Plan,
    extra: &[Arc<dyn Listener>],
    registry: &Arc<ThresholdRegistry>,
    cancel: &CancellationToken,
) -> Vec<ScenarioStats> {
    let mut results = Vec::with_capacity(plan.scenarios.len());

    for scenario in &plan.scenarios {
        let stats = run_scenario(
            Arc::new(scenario.clone()),
            &plan.http_client,
            extra.to_vec(),
            registry,
            cancel,
        )
        .await;
        let stop = stats.status == ScenarioStatus::Cancelled;
        results.push(stats);
        if stop {
            tracing::warn!("run cancelled, skipping remaining scenarios");
            break;
        }
    }

    results
}

async fn execute_parallel(
    plan: &Plan,
    extra: &[Arc<dyn Listener>],
    registry: &Arc<ThresholdRegistry>,
    cancel: &CancellationToken,
) -> Vec<ScenarioStats> {
    let mut tasks = JoinSet::new();

    for (index, scenario) in plan.scenarios.iter().enumerate() {
        let scenario = Arc::new(scenario.clone());
        let http_client = plan.http_client.clone();
        let extra = extra.to_vec();
        let registry = registry.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let stats = run_scenario(scenario, &http_client, extra, &registry, &cancel).await;
            (index, stats)
        });
    }

    let mut results = Vec::with_capacity(plan.scenarios.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => tracing::error!(error = %e, "scenario task failed"),
        }
    }

    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, stats)| stats).collect()
}

async fn run_scenario(
    scenario: Arc<Scenario>,
    http_client: &HttpClientConfig,
    extra: Vec<Arc<dyn Listener>>,
    registry: &ThresholdRegistry,
    cancel: &CancellationToken,
) -> ScenarioStats {
    let counters = Arc::new(Counters::new());
    let start = Instant::now();

    let outcome = match create_client(http_client) {
        Ok(client) => {
            let mut listeners: Vec<Arc<dyn Listener>> = Vec::with_capacity(extra.len() + 1);
            listeners.push(counters.clone());
            listeners.extend(extra);

            Runner::new(client, scenario.clone(), listeners)
                .run(registry, cancel)
                .await
        }
        Err(e) => Err(RunError::Client(e)),
    };

    let (duration, thresholds, status) = match outcome {
        Ok(report) => {
            let thresholds =
                registry.evaluate(report.run_id, &scenario.name, &scenario.thresholds, &counters);
            (report.duration, thresholds, ScenarioStatus::Completed)
        }
        Err(RunError::Cancelled) => {
            tracing::warn!(scenario = %scenario.name, "scenario cancelled");
            (start.elapsed(), not_evaluated(), ScenarioStatus::Cancelled)
        }
        Err(e) => {
            tracing::error!(scenario = %scenario.name, error = %e, "scenario failed");
            (start.elapsed(), not_evaluated(), ScenarioStatus::Failed(e.to_string()))
        }
    };

    ScenarioStats {
        name: scenario.name.clone(),
        counters,
        duration: duration.max(Duration::from_millis(1)),
        thresholds,
        status,
    }
}

fn not_evaluated() -> ThresholdReport {
    ThresholdReport {
        passed: false,
        outcomes: Vec::new(),
    }
}
