use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use watch_core::{AssetQuote, MonitorError, PriceSource};

pub const DEFAULT_COINGECKO_URL: &str = "https://api.coingecko.com/api/v3/simple/price";

/// CoinGecko `simple/price` client.
#[derive(Clone)]
pub struct CoinGeckoClient {
    client: Client,
    url: String,
    vs_currency: String,
}

impl CoinGeckoClient {
    pub fn new(url: impl Into<String>, vs_currency: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: crate::build_client(timeout),
            url: url.into(),
            vs_currency: vs_currency.into().to_lowercase(),
        }
    }
}

#[async_trait]
impl PriceSource for CoinGeckoClient {
    async fn fetch_quotes(
        &self,
        asset_ids: &[String],
    ) -> Result<HashMap<String, AssetQuote>, MonitorError> {
        if asset_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let ids = asset_ids.join(",");
        let request = self.client.get(&self.url).query(&[
            ("ids", ids.as_str()),
            ("vs_currencies", self.vs_currency.as_str()),
            ("include_24hr_change", "true"),
        ]);

        let body = crate::fetch_body("CoinGecko", request).await?;
        let json: Value = serde_json::from_str(&body)
            .map_err(|e| MonitorError::MalformedResponse(format!("CoinGecko: {}", e)))?;

        let quotes = parse_quotes(&json, &self.vs_currency)?;
        tracing::debug!(
            "CoinGecko returned {} of {} requested quotes",
            quotes.len(),
            asset_ids.len()
        );
        Ok(quotes)
    }
}

/// Parse a `simple/price` body such as
/// `{"bitcoin": {"eur": 61000.0, "eur_24h_change": 2.4}}`.
///
/// Entries lacking either the price or the 24h change are left out (the
/// provider does this for ids it does not know). Anything that is not an
/// object of objects, or a negative price, rejects the whole response.
pub fn parse_quotes(
    json: &Value,
    vs_currency: &str,
) -> Result<HashMap<String, AssetQuote>, MonitorError> {
    let entries = json.as_object().ok_or_else(|| {
        MonitorError::MalformedResponse("CoinGecko: expected a JSON object".to_string())
    })?;

    let change_key = format!("{}_24h_change", vs_currency);
    let mut quotes = HashMap::with_capacity(entries.len());

    for (asset_id, entry) in entries {
        let fields = entry.as_object().ok_or_else(|| {
            MonitorError::MalformedResponse(format!("CoinGecko: entry for {} is not an object", asset_id))
        })?;

        let price = fields.get(vs_currency).and_then(Value::as_f64);
        let change = fields.get(&change_key).and_then(Value::as_f64);

        match (price, change) {
            (Some(price), Some(change_24h_percent)) => {
                if !price.is_finite() || price < 0.0 {
                    return Err(MonitorError::MalformedResponse(format!(
                        "CoinGecko: invalid price {} for {}",
                        price, asset_id
                    )));
                }
                quotes.insert(
                    asset_id.clone(),
                    AssetQuote {
                        price,
                        change_24h_percent,
                    },
                );
            }
            _ => tracing::debug!("CoinGecko entry for {} is incomplete, skipping", asset_id),
        }
    }

    Ok(quotes)
}
