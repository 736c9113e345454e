use std::collections::HashMap;

use async_trait::async_trait;

use crate::{AssetQuote, MonitorError, NewsItem};

/// Batched current-price provider.
///
/// Assets the provider has no data for are simply absent from the map.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_quotes(
        &self,
        asset_ids: &[String],
    ) -> Result<HashMap<String, AssetQuote>, MonitorError>;
}

/// Recent news filtered by asset identifiers. An empty result is not an error.
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch_news(&self, asset_ids: &[String]) -> Result<Vec<NewsItem>, MonitorError>;
}

/// Outbound delivery of a single text event.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<(), MonitorError>;
}
