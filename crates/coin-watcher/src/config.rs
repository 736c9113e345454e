use anyhow::{bail, Context, Result};
use feed_clients::{DEFAULT_COINGECKO_URL, DEFAULT_CRYPTOPANIC_URL};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    // Scheduling
    pub check_interval_seconds: u64,       // 3600 (1 hour)
    pub fetch_timeout_seconds: u64,        // 30, bounds every external call

    // Price source
    pub coingecko_api_url: String,
    pub vs_currency: String,               // "eur"

    // News source (disabled when no key)
    pub news_api_key: Option<String>,
    pub news_api_url: String,

    // Startup seeding
    pub watchlist_seed: Vec<(String, f64)>,
    pub unwatch: Vec<String>,
    pub run_threshold_percent: Option<f64>,
    pub run_consecutive_periods: Option<usize>,

    // Database
    pub database_url: String,
}

impl WatcherConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            check_interval_seconds: env::var("CHECK_INTERVAL")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .context("CHECK_INTERVAL must be a whole number of seconds")?,
            fetch_timeout_seconds: env::var("FETCH_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("FETCH_TIMEOUT_SECS must be a whole number of seconds")?,

            coingecko_api_url: env::var("COINGECKO_API_URL")
                .unwrap_or_else(|_| DEFAULT_COINGECKO_URL.to_string()),
            vs_currency: env::var("VS_CURRENCY")
                .unwrap_or_else(|_| "eur".to_string())
                .trim()
                .to_lowercase(),

            news_api_key: env::var("NEWS_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            news_api_url: env::var("NEWS_API_URL")
                .unwrap_or_else(|_| DEFAULT_CRYPTOPANIC_URL.to_string()),

            watchlist_seed: parse_watchlist(&env::var("WATCHLIST").unwrap_or_default())?,
            unwatch: env::var("UNWATCH")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            run_threshold_percent: env::var("RUN_THRESHOLD_PERCENT")
                .ok()
                .map(|v| v.trim().parse())
                .transpose()
                .context("RUN_THRESHOLD_PERCENT must be a number")?,
            run_consecutive_periods: env::var("RUN_CONSECUTIVE_PERIODS")
                .ok()
                .map(|v| v.trim().parse())
                .transpose()
                .context("RUN_CONSECUTIVE_PERIODS must be a whole number")?,

            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:coins.db".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.check_interval_seconds == 0 {
            bail!("CHECK_INTERVAL must be greater than zero");
        }
        if self.fetch_timeout_seconds == 0 {
            bail!("FETCH_TIMEOUT_SECS must be greater than zero");
        }
        if self.vs_currency.is_empty() {
            bail!("VS_CURRENCY must not be empty");
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }
}

/// Parse `bitcoin:5,ethereum:7.5` into `(asset_id, threshold)` pairs.
pub fn parse_watchlist(raw: &str) -> Result<Vec<(String, f64)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| -> Result<(String, f64)> {
            let (asset, threshold) = entry
                .split_once(':')
                .with_context(|| format!("WATCHLIST entry {:?} must look like asset:threshold", entry))?;
            let threshold: f64 = threshold
                .trim()
                .parse()
                .with_context(|| format!("WATCHLIST threshold for {:?} is not a number", asset))?;
            Ok((asset.trim().to_string(), threshold))
        })
        .collect()
}
