fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Message types are prost derives in src/distributed/proto.rs, so the
    // stubs are generated from a manual service definition and protoc is
    // not needed.
    let metrics_service = tonic_build::manual::Service::builder()
        .name("MetricsV1")
        .package("volley.metrics")
        .method(
            tonic_build::manual::Method::builder()
                .name("send")
                .route_name("Send")
                .input_type("crate::distributed::proto::MetricRecord")
                .output_type("crate::distributed::proto::Ack")
                .codec_path("tonic::codec::ProstCodec")
                .client_streaming()
                .build(),
        )
        .build();

    tonic_build::manual::Builder::new().compile(&[metrics_service]);
}
