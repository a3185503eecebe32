use crate::distributed::metrics::{CollectorMetrics, serve_metrics_endpoint};
use crate::distributed::proto::metrics_v1_server::{MetricsV1, MetricsV1Server};
use crate::distributed::proto::{Ack, MetricRecord};
use crate::error::CollectorError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};

/// Receives record streams and folds them into [`CollectorMetrics`].
/// No threshold evaluation happens here.
#[derive(Clone)]
pub struct Collector {
    metrics: Arc<CollectorMetrics>,
}

impl Collector {
    pub fn new(metrics: Arc<CollectorMetrics>) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> Arc<CollectorMetrics> {
        self.metrics.clone()
    }
}

#[tonic::async_trait]
impl MetricsV1 for Collector {
    async fn send(
        &self,
        request: Request<Streaming<MetricRecord>>,
    ) -> Result<Response<Ack>, Status> {
        let peer = request.remote_addr();
        let mut stream = request.into_inner();
        let mut received = 0u64;

        while let Some(record) = stream.message().await? {
            self.metrics.observe(&record);
            received += 1;
        }

        tracing::debug!(?peer, received, "batch received");
        Ok(Response::new(Ack {}))
    }
}

#[derive(Debug, Clone)]
pub struct CollectorOptions {
    pub grpc_addr: SocketAddr,
    pub metrics_addr: SocketAddr,
    pub prefix: String,
}

/// Serves the record stream on an already bound listener until `shutdown`.
pub async fn serve_grpc(
    listener: TcpListener,
    collector: Collector,
    shutdown: CancellationToken,
) -> Result<(), CollectorError> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("collector listening on {}", addr);
    }

    tonic::transport::Server::builder()
        .add_service(MetricsV1Server::new(collector))
        .serve_with_incoming_shutdown(
            TcpListenerStream::new(listener),
            shutdown.cancelled_owned(),
        )
        .await?;

    tracing::debug!("collector stopped");
    Ok(())
}

/// Binds both the record stream and the scrape endpoint, and serves them
/// until `cancel` fires.
pub async fn serve(options: CollectorOptions, cancel: CancellationToken) -> Result<(), CollectorError> {
    let metrics = Arc::new(CollectorMetrics::new(&options.prefix)?);

    let grpc_listener = bind(options.grpc_addr).await?;
    let metrics_listener = bind(options.metrics_addr).await?;

    let scrape = tokio::spawn(serve_metrics_endpoint(
        metrics_listener,
        metrics.clone(),
        cancel.clone(),
    ));

    let served = serve_grpc(grpc_listener, Collector::new(metrics), cancel.clone()).await;

    cancel.cancel();
    if let Err(e) = scrape.await {
        tracing::error!("metrics endpoint task failed: {}", e);
    }

    served
}

async fn bind(addr: SocketAddr) -> Result<TcpListener, CollectorError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| CollectorError::Bind {
            address: addr.to_string(),
            source,
        })
}
