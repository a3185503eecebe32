//! Prometheus view of received records, and the scrape endpoint serving it.

use crate::distributed::proto::MetricRecord;
use crate::error::CollectorError;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

const LABELS: [&str; 9] = [
    "instance_id",
    "group_id",
    "scenario",
    "method",
    "url",
    "code",
    "failed",
    "timeout",
    "success",
];

pub struct CollectorMetrics {
    registry: Registry,
    requests: IntCounterVec,
    duration: HistogramVec,
    records: IntCounter,
}

impl CollectorMetrics {
    pub fn new(prefix: &str) -> Result<Self, CollectorError> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new(
                format!("{}http_requests_total", prefix),
                "HTTP attempts reported by generator instances",
            ),
            &LABELS,
        )?;

        let duration = HistogramVec::new(
            HistogramOpts::new(
                format!("{}http_request_duration_seconds", prefix),
                "HTTP attempt latency reported by generator instances",
            ),
            &LABELS,
        )?;

        let records = IntCounter::with_opts(Opts::new(
            format!("{}collector_records_total", prefix),
            "Records received by the collector",
        ))?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(records.clone()))?;

        Ok(Self {
            registry,
            requests,
            duration,
            records,
        })
    }

    pub fn observe(&self, record: &MetricRecord) {
        let failed = bool_label(record.failed);
        let timeout = bool_label(record.timeout);
        let success = bool_label(record.success);
        let labels = [
            record.instance_id.as_str(),
            record.group_id.as_str(),
            record.scenario.as_str(),
            record.method.as_str(),
            record.url.as_str(),
            record.code.as_str(),
            failed,
            timeout,
            success,
        ];

        self.records.inc();
        self.requests.with_label_values(&labels).inc();
        self.duration
            .with_label_values(&labels)
            .observe(record.latency_seconds);
    }

    pub fn records(&self) -> u64 {
        self.records.get()
    }

    /// Encode all metrics in Prometheus text format
    pub fn encode(&self) -> Result<String, CollectorError> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()).into())
    }
}

fn bool_label(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

/// Serve `/metrics` and `/health` on an already bound listener until cancelled.
pub async fn serve_metrics_endpoint(
    listener: TcpListener,
    metrics: Arc<CollectorMetrics>,
    cancel_token: CancellationToken,
) {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("metrics endpoint listening on http://{}/metrics", addr);
    }

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                tracing::debug!("metrics endpoint shutting down");
                break;
            }
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((socket, _)) => {
                        let metrics = metrics.clone();
                        tokio::spawn(handle_scrape(socket, metrics));
                    }
                    Err(e) => {
                        tracing::warn!("failed to accept connection: {}", e);
                    }
                }
            }
        }
    }
}

async fn handle_scrape(mut socket: TcpStream, metrics: Arc<CollectorMetrics>) {
    let mut buf = [0u8; 1024];
    let mut len = 0;
    while len < buf.len() && !buf[..len].windows(2).any(|w| w == b"\r\n") {
        match socket.read(&mut buf[len..]).await {
            Ok(0) => break,
            Ok(n) => len += n,
            Err(_) => return,
        }
    }
    let request = String::from_utf8_lossy(&buf[..len]);

    let response = if request.starts_with("GET /metrics") {
        match metrics.encode() {
            Ok(body) => http_response("200 OK", "text/plain; version=0.0.4; charset=utf-8", &body),
            Err(e) => {
                tracing::error!("failed to encode metrics: {}", e);
                http_response("500 Internal Server Error", "text/plain", "Internal Server Error")
            }
        }
    } else if request.starts_with("GET /health") {
        http_response("200 OK", "text/plain", "OK")
    } else {
        http_response("404 Not Found", "text/plain", "Not Found")
    };

    let _ = socket.write_all(response.as_bytes()).await;
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    )
}
