use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical form of an asset identifier: trimmed and lowercase.
pub fn normalize_asset_id(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Human-facing name for an asset id ("bitcoin" -> "Bitcoin").
pub fn display_name(asset_id: &str) -> String {
    let mut chars = asset_id.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// An entry on the watch-list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchedAsset {
    pub asset_id: String,
    pub threshold_percent: f64,
}

/// One recorded price observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub asset_id: String,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

impl PriceSample {
    pub fn now(asset_id: impl Into<String>, price: f64) -> Self {
        Self {
            asset_id: asset_id.into(),
            timestamp: Utc::now(),
            price,
        }
    }
}

/// Current price and 24h change as reported by a price source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssetQuote {
    pub price: f64,
    pub change_24h_percent: f64,
}

/// A news headline from the news source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub url: String,
}

impl fmt::Display for NewsItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "🔔 New article: {}\n{}", self.title, self.url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertKind {
    /// 24h change reached the asset's own threshold
    ThresholdAlert,

    /// Strictly increasing run over the configured number of periods
    RunAlert,
}

/// Produced by a detector and handed straight to the notifier; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub asset_id: String,
    pub kind: AlertKind,
    pub magnitude_percent: f64,
    pub periods_considered: usize,
    pub threshold_percent: f64,
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = display_name(&self.asset_id);
        match self.kind {
            AlertKind::ThresholdAlert => write!(
                f,
                "📈 {} is up {:.2}% in the last 24h (threshold {}%)",
                name, self.magnitude_percent, self.threshold_percent
            ),
            AlertKind::RunAlert => write!(
                f,
                "🚀 {} ran up {:.2}% over the last {} intervals!",
                name, self.magnitude_percent, self.periods_considered
            ),
        }
    }
}

/// Text of the diagnostic sent when a price fetch fails.
pub fn fetch_failure_message(error: &impl fmt::Display) -> String {
    format!("⚠️ Error fetching price data: {}", error)
}
