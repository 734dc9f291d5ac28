use std::time::Duration;

use arcfetch_config::Config;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::RetryTransientMiddleware;
use retry_policies::policies::ExponentialBackoff;

/// The retry policy used for requests and for resuming interrupted downloads.
pub fn retry_policy(config: &Config) -> ExponentialBackoff {
    ExponentialBackoff::builder().build_with_max_retries(config.max_retries())
}

/// Builds the client used for probing, searching and downloading. Transient
/// request failures are retried according to [`retry_policy`].
///
/// The client carries no credentials, those are attached to each request of
/// the source they belong to.
pub fn build_reqwest_client(config: &Config) -> Result<ClientWithMiddleware, reqwest::Error> {
    static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

    if config.tls_no_verify() {
        tracing::warn!(
            "TLS verification is disabled. This is insecure and should only be used for testing or internal networks."
        );
    }

    let client = Client::builder()
        .pool_max_idle_per_host(20)
        .user_agent(APP_USER_AGENT)
        .danger_accept_invalid_certs(config.tls_no_verify())
        .read_timeout(config.read_timeout())
        .connect_timeout(Duration::from_secs(30))
        .build()?;

    Ok(ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy(
            config,
        )))
        .build())
}
