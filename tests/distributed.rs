//! Sender/collector integration tests
//!
//! Collectors run in-process on an ephemeral port.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};
use volley::config::parse_plan;
use volley::distributed::proto::metrics_v1_server::{MetricsV1, MetricsV1Server};
use volley::distributed::proto::{Ack, MetricRecord};
use volley::distributed::{Collector, CollectorMetrics, Sender, serve_grpc};
use volley::engine::{Listener, execute};
use volley::error::SenderError;
use volley::types::{AttemptError, CounterName, ErrorKind, RequestInfo};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Clone, Default)]
struct Recording {
    records: Arc<Mutex<Vec<MetricRecord>>>,
}

#[tonic::async_trait]
impl MetricsV1 for Recording {
    async fn send(
        &self,
        request: Request<Streaming<MetricRecord>>,
    ) -> Result<Response<Ack>, Status> {
        let mut stream = request.into_inner();
        while let Some(record) = stream.message().await? {
            self.records.lock().unwrap().push(record);
        }
        Ok(Response::new(Ack {}))
    }
}

async fn start_recording() -> (SocketAddr, Recording, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let recording = Recording::default();
    let shutdown = CancellationToken::new();

    let service = MetricsV1Server::new(recording.clone());
    let stop = shutdown.clone();
    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(service)
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), stop.cancelled_owned())
            .await
            .unwrap();
    });

    (addr, recording, shutdown)
}

async fn start_collector() -> (SocketAddr, Arc<CollectorMetrics>, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let metrics = Arc::new(CollectorMetrics::new("volley_").unwrap());
    let shutdown = CancellationToken::new();

    tokio::spawn(serve_grpc(
        listener,
        Collector::new(metrics.clone()),
        shutdown.clone(),
    ));

    (addr, metrics, shutdown)
}

fn info(code: Option<&str>) -> RequestInfo {
    RequestInfo {
        scenario: "checkout".to_string(),
        method: "GET".to_string(),
        url: "http://shop/cart".to_string(),
        code: code.map(str::to_string),
    }
}

#[tokio::test]
async fn one_flush_delivers_every_tracked_response() {
    let (addr, recording, shutdown) = start_recording().await;
    let sender = Sender::connect(&addr.to_string(), Some("eu".to_string()))
        .await
        .unwrap();

    for _ in 0..25 {
        sender.track_response(&info(Some("200")), true, Duration::from_millis(12));
    }
    assert_eq!(sender.pending(), 25);

    let sent = sender.flush().await.unwrap();
    assert_eq!(sent, 25);
    assert_eq!(sender.pending(), 0);

    let records = recording.records.lock().unwrap().clone();
    assert_eq!(records.len(), 25);
    for record in &records {
        assert_eq!(record.instance_id, sender.instance_id());
        assert_eq!(record.group_id, "eu");
        assert_eq!(record.code, "200");
        assert!(record.success);
        assert!(!record.failed);
        assert!((record.latency_seconds - 0.012).abs() < 1e-9);
    }

    shutdown.cancel();
}

#[tokio::test]
async fn failed_attempts_carry_failure_flags() {
    let (addr, recording, shutdown) = start_recording().await;
    let sender = Sender::connect(&addr.to_string(), None).await.unwrap();

    sender.track_failed(&info(None), &AttemptError::new(ErrorKind::Timeout, "timed out"));
    sender.track_failed(&info(None), &AttemptError::new(ErrorKind::Refused, "refused"));
    sender.track_response(&info(Some("500")), false, Duration::from_millis(3));
    sender.flush().await.unwrap();

    let records = recording.records.lock().unwrap().clone();
    assert_eq!(records.len(), 3);
    assert!(records[0].failed && records[0].timeout && records[0].code.is_empty());
    assert!(records[1].failed && !records[1].timeout);
    assert!(!records[2].failed && !records[2].timeout && !records[2].success);
    assert_eq!(records[2].code, "500");
    assert!(records.iter().all(|r| r.group_id.is_empty()));

    shutdown.cancel();
}

#[tokio::test]
async fn empty_flush_sends_nothing() {
    let (addr, recording, shutdown) = start_recording().await;
    let sender = Sender::connect(&addr.to_string(), None).await.unwrap();

    assert_eq!(sender.flush().await.unwrap(), 0);
    assert!(recording.records.lock().unwrap().is_empty());

    shutdown.cancel();
}

#[tokio::test]
async fn run_flushes_once_more_on_cancel() {
    let (addr, recording, shutdown) = start_recording().await;
    let sender = Arc::new(Sender::connect(&addr.to_string(), None).await.unwrap());

    for _ in 0..3 {
        sender.track_response(&info(Some("200")), true, Duration::from_millis(1));
    }

    let stop = CancellationToken::new();
    stop.cancel();
    sender.run(stop).await;

    assert_eq!(recording.records.lock().unwrap().len(), 3);
    shutdown.cancel();
}

#[tokio::test]
async fn collector_maps_records_to_metrics() {
    let (addr, metrics, shutdown) = start_collector().await;
    let sender = Sender::connect(&addr.to_string(), Some("us".to_string()))
        .await
        .unwrap();

    for _ in 0..4 {
        sender.track_response(&info(Some("200")), true, Duration::from_millis(20));
    }
    sender.track_response(&info(Some("503")), false, Duration::from_millis(8));
    sender.track_failed(&info(None), &AttemptError::new(ErrorKind::Timeout, "timed out"));
    sender.flush().await.unwrap();

    assert_eq!(metrics.records(), 6);
    let encoded = metrics.encode().unwrap();
    assert!(encoded.contains(&format!(r#"instance_id="{}""#, sender.instance_id())));
    assert!(encoded.contains(r#"group_id="us""#));
    assert!(encoded.contains(r#"timeout="true""#));
    assert!(encoded.contains(r#"code="503",failed="false""#));
    assert!(encoded.contains("volley_http_request_duration_seconds_count{"));

    shutdown.cancel();
}

#[tokio::test]
async fn plan_execution_streams_to_collector() {
    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&target)
        .await;

    let (addr, metrics, shutdown) = start_collector().await;
    let sender = Arc::new(Sender::connect(&addr.to_string(), None).await.unwrap());

    let plan = parse_plan(
        &format!(
            r#"
[[scenarios]]
name = "streamed"
rps = 6
duration = "1s"
threads = 2
http_request = {{ url = "{}" }}
"#,
            target.uri()
        ),
        "test",
    )
    .unwrap();

    let extra: Vec<Arc<dyn Listener>> = vec![sender.clone()];
    let stats = execute(&plan, &extra, &CancellationToken::new()).await;
    sender.flush().await.unwrap();

    assert_eq!(
        Some(metrics.records()),
        stats.counter("streamed", CounterName::Total)
    );
    shutdown.cancel();
}

#[tokio::test]
async fn connect_failure_is_a_hard_error() {
    let err = Sender::connect("127.0.0.1:1", None).await.err().unwrap();
    assert!(matches!(err, SenderError::Connect { .. }));
}

#[tokio::test]
async fn invalid_address_is_rejected() {
    let err = Sender::connect("http://bad host", None).await.err().unwrap();
    assert!(matches!(err, SenderError::Address { .. }));
}
