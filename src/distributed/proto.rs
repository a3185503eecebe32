//! Wire types for the `volley.metrics.MetricsV1` service.

/// One attempt as seen by a sender instance.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MetricRecord {
    #[prost(string, tag = "1")]
    pub instance_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub group_id: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub scenario: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub method: ::prost::alloc::string::String,
    #[prost(string, tag = "5")]
    pub url: ::prost::alloc::string::String,
    /// Empty when no response arrived.
    #[prost(string, tag = "6")]
    pub code: ::prost::alloc::string::String,
    #[prost(bool, tag = "7")]
    pub failed: bool,
    #[prost(bool, tag = "8")]
    pub timeout: bool,
    #[prost(bool, tag = "9")]
    pub success: bool,
    #[prost(double, tag = "10")]
    pub latency_seconds: f64,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Ack {}

include!(concat!(env!("OUT_DIR"), "/volley.metrics.MetricsV1.rs"));

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_record_encoding_is_stable() {
        let record = MetricRecord {
            instance_id: "i".to_string(),
            group_id: String::new(),
            scenario: "s".to_string(),
            method: "GET".to_string(),
            url: "http://localhost".to_string(),
            code: "200".to_string(),
            failed: false,
            timeout: false,
            success: true,
            latency_seconds: 0.125,
        };
        let bytes = record.encode_to_vec();
        assert_eq!(MetricRecord::decode(bytes.as_slice()).unwrap(), record);
        assert!(Ack {}.encode_to_vec().is_empty());
    }
}
