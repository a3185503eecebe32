use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tokio_util::sync::CancellationToken;

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorExit {
    /// Duration elapsed; queue and stop signal were both closed.
    Deadline,
    /// Cancelled; only the queue was closed.
    Cancelled,
    /// Every worker dropped its end of the queue.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorReport {
    pub emitted: u64,
    pub exit: GeneratorExit,
}

/// Emits numbered tickets once per second at a constant or linearly
/// ramped rate. The first batch goes out immediately.
#[derive(Debug, Clone)]
pub struct RateGenerator {
    duration: Duration,
    start_rps: u32,
    target_rps: u32,
}

impl RateGenerator {
    pub fn new(duration: Duration, start_rps: u32, target_rps: u32) -> Self {
        Self {
            duration,
            start_rps,
            target_rps,
        }
    }

    /// Tickets for tick `k` (1-based): `S + round((T - S) * k / D)`,
    /// clamped between `S` and `T`.
    pub fn rate_at(&self, tick: u64) -> u64 {
        let seconds = self.duration.as_secs_f64().max(1.0);
        let start = f64::from(self.start_rps);
        let target = f64::from(self.target_rps);
        let rate = start + ((target - start) * tick as f64 / seconds).round();
        rate.clamp(start.min(target), start.max(target)) as u64
    }

    pub async fn run(
        self,
        queue: mpsc::Sender<u64>,
        stop: CancellationToken,
        cancel: CancellationToken,
    ) -> GeneratorReport {
        let deadline = sleep(self.duration);
        tokio::pin!(deadline);

        let mut ticker = interval_at(Instant::now() + TICK, TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut emitted = 0u64;
        let mut tick = 1u64;

        let exit = 'generate: loop {
            let batch = self.rate_at(tick);
            tracing::trace!(tick, batch, "generating tickets");

            for _ in 0..batch {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break 'generate GeneratorExit::Cancelled,
                    _ = &mut deadline => break 'generate GeneratorExit::Deadline,
                    sent = queue.send(emitted + 1) => {
                        if sent.is_err() {
                            break 'generate GeneratorExit::Closed;
                        }
                        emitted += 1;
                    }
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break GeneratorExit::Cancelled,
                _ = &mut deadline => break GeneratorExit::Deadline,
                _ = ticker.tick() => tick += 1,
            }
        };

        drop(queue);
        if exit == GeneratorExit::Deadline {
            stop.cancel();
        }

        tracing::debug!(emitted, ?exit, "generator finished");

        GeneratorReport { emitted, exit }
    }
}
