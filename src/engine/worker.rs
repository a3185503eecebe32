use crate::checker::Checker;
use crate::engine::Listener;
use crate::engine::thresholds::CheckCounters;
use crate::error::RunError;
use crate::http::execute_request;
use crate::types::{RequestInfo, Scenario};
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Everything one attempt needs, shared by all workers of a segment.
pub struct Attempt {
    scenario: Arc<Scenario>,
    client: Client,
    listeners: Arc<[Arc<dyn Listener>]>,
    check_counters: Arc<CheckCounters>,
}

impl Attempt {
    pub fn new(
        scenario: Arc<Scenario>,
        client: Client,
        listeners: Arc<[Arc<dyn Listener>]>,
        check_counters: Arc<CheckCounters>,
    ) -> Self {
        Self {
            scenario,
            client,
            listeners,
            check_counters,
        }
    }

    fn info(&self, code: Option<String>) -> RequestInfo {
        RequestInfo {
            scenario: self.scenario.name.clone(),
            method: self.scenario.request.method.to_string(),
            url: self.scenario.request.url.clone(),
            code,
        }
    }

    /// Executes one ticket. Transport failures are reported to listeners;
    /// only cancellation is returned as an error, and the aborted attempt
    /// is not counted.
    pub async fn process(
        &self,
        thread_id: u32,
        ticket: u64,
        cancel: &CancellationToken,
    ) -> Result<(), RunError> {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RunError::Cancelled),
            outcome = execute_request(&self.client, &self.scenario.request) => outcome,
        };

        match outcome {
            Ok(exchange) => {
                let response = &exchange.response;
                let (results, success) = Checker::new(&self.scenario.checks).validate(response);

                for (check, result) in self.scenario.checks.iter().zip(&results) {
                    self.check_counters.record(check.kind(), result.pass);
                    match &result.error {
                        Some(error) => tracing::warn!(
                            thread_id,
                            ticket,
                            check = %check.kind(),
                            error = %error,
                            "check could not be evaluated"
                        ),
                        None => tracing::debug!(
                            thread_id,
                            ticket,
                            check = %check.kind(),
                            name = check.name().unwrap_or_default(),
                            actual = %result.actual,
                            pass = result.pass,
                            "check result"
                        ),
                    }
                }

                tracing::debug!(
                    thread_id,
                    ticket,
                    code = response.status,
                    latency_ms = exchange.latency.as_millis() as u64,
                    success,
                    "response"
                );

                let info = self.info(Some(response.status.to_string()));
                for listener in self.listeners.iter() {
                    listener.track_response(&info, success, exchange.latency);
                }
            }
            Err(error) => {
                tracing::debug!(
                    thread_id,
                    ticket,
                    kind = error.kind.as_str(),
                    error = %error.message,
                    "request failed"
                );

                let info = self.info(None);
                for listener in self.listeners.iter() {
                    listener.track_failed(&info, &error);
                }
            }
        }

        Ok(())
    }
}

/// Fixed set of workers pulling tickets from one queue.
pub struct WorkerPool {
    threads: u32,
    attempt: Arc<Attempt>,
}

impl WorkerPool {
    pub fn new(threads: u32, attempt: Arc<Attempt>) -> Self {
        Self {
            threads: threads.max(1),
            attempt,
        }
    }

    /// Runs until the queue closes, `stop` fires, or `cancel` fires.
    /// Returns the number of tickets processed, or the first worker error.
    pub async fn run(
        self,
        queue: mpsc::Receiver<u64>,
        stop: CancellationToken,
        cancel: CancellationToken,
    ) -> Result<u64, RunError> {
        let queue = Arc::new(Mutex::new(queue));
        let mut workers = JoinSet::new();

        for thread_id in 0..self.threads {
            workers.spawn(worker_loop(
                thread_id,
                self.attempt.clone(),
                queue.clone(),
                stop.clone(),
                cancel.clone(),
            ));
        }
        drop(queue);

        let mut processed = 0;
        let mut first_error = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(count)) => processed += count,
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    tracing::error!(error = %e, "worker task failed");
                    first_error.get_or_insert(RunError::Worker(e));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(processed),
        }
    }
}

async fn worker_loop(
    thread_id: u32,
    attempt: Arc<Attempt>,
    queue: Arc<Mutex<mpsc::Receiver<u64>>>,
    stop: CancellationToken,
    cancel: CancellationToken,
) -> Result<u64, RunError> {
    tracing::trace!(thread_id, "worker started");
    let mut processed = 0;

    loop {
        let ticket = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = cancel.cancelled() => return Err(RunError::Cancelled),
            ticket = async { queue.lock().await.recv().await } => ticket,
        };

        let Some(ticket) = ticket else { break };
        attempt.process(thread_id, ticket, &cancel).await?;
        processed += 1;
    }

    tracing::trace!(thread_id, processed, "worker stopped");
    Ok(processed)
}
