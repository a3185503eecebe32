use crate::types::HttpClientConfig;
use reqwest::Client;
use reqwest::redirect::Policy;
use std::time::Duration;

/// Builds the client shared by every worker of a scenario. Pool size,
/// timeout and redirect policy are fixed here for the whole run.
pub fn create_client(config: &HttpClientConfig) -> Result<Client, reqwest::Error> {
    tracing::debug!(
        disable_keep_alive = config.disable_keep_alive,
        timeout = ?config.timeout,
        max_idle_conns_per_host = config.max_idle_conns_per_host,
        "creating http client"
    );

    let mut builder = Client::builder()
        .timeout(config.timeout)
        .tcp_nodelay(true)
        .user_agent(format!("volley/{}", env!("CARGO_PKG_VERSION")));

    if config.disable_keep_alive {
        builder = builder
            .pool_max_idle_per_host(0)
            .pool_idle_timeout(Duration::ZERO);
    } else {
        builder = builder
            .pool_max_idle_per_host(config.max_idle_conns_per_host)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60));
    }

    if config.disable_follow_redirects {
        builder = builder.redirect(Policy::none());
    }

    builder.build()
}
