use crate::distributed::proto::MetricRecord;
use crate::distributed::proto::metrics_v1_client::MetricsV1Client;
use crate::engine::Listener;
use crate::error::SenderError;
use crate::types::{AttemptError, RequestInfo};
use std::mem;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, Endpoint};

const FLUSH_INTERVAL: Duration = Duration::from_secs(1);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Listener that queues every attempt and streams the queue to a collector
/// once per second. Delivery is best effort: a failed batch is dropped.
pub struct Sender {
    instance_id: String,
    group_id: String,
    client: MetricsV1Client<Channel>,
    queue: Mutex<Vec<MetricRecord>>,
}

impl Sender {
    /// `address` is `host:port` or a full `http://` URI.
    pub async fn connect(address: &str, group: Option<String>) -> Result<Self, SenderError> {
        let uri = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };

        let endpoint = Endpoint::from_shared(uri)
            .map_err(|source| SenderError::Address {
                address: address.to_string(),
                source,
            })?
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(FLUSH_TIMEOUT);

        let channel = endpoint
            .connect()
            .await
            .map_err(|source| SenderError::Connect {
                address: address.to_string(),
                source,
            })?;

        let instance_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(instance_id = %instance_id, collector = address, "connected to collector");

        Ok(Self {
            instance_id,
            group_id: group.unwrap_or_default(),
            client: MetricsV1Client::new(channel),
            queue: Mutex::new(Vec::new()),
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn pending(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Streams everything queued so far in one call. Returns the number of
    /// records sent; on error those records are gone.
    pub async fn flush(&self) -> Result<usize, SenderError> {
        let batch = mem::take(&mut *self.queue.lock().unwrap_or_else(PoisonError::into_inner));
        if batch.is_empty() {
            return Ok(0);
        }

        let count = batch.len();
        let mut client = self.client.clone();
        let mut request = tonic::Request::new(tokio_stream::iter(batch));
        request.set_timeout(FLUSH_TIMEOUT);
        client.send(request).await?;

        tracing::trace!(count, "flushed metrics");
        Ok(count)
    }

    /// Flushes every second until cancelled, then flushes once more.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + FLUSH_INTERVAL, FLUSH_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.flush_logged().await,
            }
        }

        self.flush_logged().await;
        tracing::debug!(instance_id = %self.instance_id, "sender stopped");
    }

    async fn flush_logged(&self) {
        if let Err(e) = self.flush().await {
            tracing::warn!(error = %e, "dropping metrics batch");
        }
    }

    fn enqueue(&self, info: &RequestInfo, failed: bool, timeout: bool, success: bool, latency: Duration) {
        let record = MetricRecord {
            instance_id: self.instance_id.clone(),
            group_id: self.group_id.clone(),
            scenario: info.scenario.clone(),
            method: info.method.clone(),
            url: info.url.clone(),
            code: info.code.clone().unwrap_or_default(),
            failed,
            timeout,
            success,
            latency_seconds: latency.as_secs_f64(),
        };
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}

impl Listener for Sender {
    fn track_failed(&self, info: &RequestInfo, error: &AttemptError) {
        self.enqueue(info, true, error.is_timeout(), false, Duration::ZERO);
    }

    fn track_response(&self, info: &RequestInfo, success: bool, latency: Duration) {
        // A response arrived, so the transport flags stay clear.
        self.enqueue(info, false, false, success, latency);
    }
}
