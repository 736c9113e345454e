mod coingecko;
mod cryptopanic;

pub use coingecko::{parse_quotes, CoinGeckoClient, DEFAULT_COINGECKO_URL};
pub use cryptopanic::{parse_news, CryptoPanicClient, DEFAULT_CRYPTOPANIC_URL};

use std::time::Duration;

use reqwest::Client;
use watch_core::MonitorError;

pub(crate) fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Send a request and map transport failures and non-2xx statuses to
/// `TransientFetch`. Returns the response body as text.
///
/// Errors never carry the request URL: query strings hold API tokens.
pub(crate) async fn fetch_body(
    provider: &str,
    builder: reqwest::RequestBuilder,
) -> Result<String, MonitorError> {
    let response = builder.send().await.map_err(|e| {
        if e.is_timeout() {
            MonitorError::TransientFetch(format!("{} request timed out", provider))
        } else {
            MonitorError::TransientFetch(format!("{}: {}", provider, e.without_url()))
        }
    })?;

    let status = response.status();
    if status.as_u16() == 429 {
        tracing::warn!("{} rate limited the request", provider);
    }
    if !status.is_success() {
        return Err(MonitorError::TransientFetch(format!(
            "{} HTTP {}: {}",
            provider,
            status,
            response.text().await.unwrap_or_default()
        )));
    }

    response
        .text()
        .await
        .map_err(|e| MonitorError::TransientFetch(format!("{}: {}", provider, e.without_url())))
}
