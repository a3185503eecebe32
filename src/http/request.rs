use crate::types::{AttemptError, HttpRequest};
use reqwest::header::HeaderMap;
use reqwest::{Client, Request};
use std::time::{Duration, Instant};

/// A response read exactly once: status and headers as received, body
/// buffered in memory so checks can look at it any number of times.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Result<String, String>,
}

#[derive(Debug, Clone)]
pub struct Exchange {
    /// From just before dispatch until the response head arrived.
    pub latency: Duration,
    pub response: CapturedResponse,
}

pub fn build_request(client: &Client, template: &HttpRequest) -> Result<Request, reqwest::Error> {
    let mut request = client.request(template.method.clone(), &template.url);

    for (name, value) in &template.headers {
        request = request.header(name.as_str(), value.as_str());
    }

    if let Some(body) = &template.body {
        request = request.body(body.clone());
    }

    request.build()
}

pub async fn execute_request(
    client: &Client,
    template: &HttpRequest,
) -> Result<Exchange, AttemptError> {
    let request = build_request(client, template).map_err(|e| AttemptError::from_reqwest(&e))?;

    let start = Instant::now();
    let response = client
        .execute(request)
        .await
        .map_err(|e| AttemptError::from_reqwest(&e))?;
    let latency = start.elapsed();

    let status = response.status().as_u16();
    let headers = response.headers().clone();
    // Always consumed, which also lets the connection go back to the pool.
    let body = response
        .text()
        .await
        .map_err(|e| format!("failed to read response body: {}", e));

    Ok(Exchange {
        latency,
        response: CapturedResponse {
            status,
            headers,
            body,
        },
    })
}
