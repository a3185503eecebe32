//! Streaming per-attempt events from generator instances to a collector.

mod collector;
mod metrics;
pub mod proto;
mod sender;

pub use collector::{Collector, CollectorOptions, serve, serve_grpc};
pub use metrics::{CollectorMetrics, serve_metrics_endpoint};
pub use sender::Sender;
