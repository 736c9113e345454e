use std::sync::Arc;
use std::time::Duration;

use price_store::PriceStore;
use watch_core::{display_name, normalize_asset_id, MonitorError, Notifier, WatchedAsset};

/// Validated watch-list and run-parameter mutations, announced to the notifier.
///
/// Shares the store with the monitor loop; the store's single connection
/// serializes these writes with the scheduler's reads.
pub struct WatchlistAdmin {
    store: Arc<PriceStore>,
    notifier: Arc<dyn Notifier>,
    call_timeout: Duration,
}

impl WatchlistAdmin {
    pub fn new(store: Arc<PriceStore>, notifier: Arc<dyn Notifier>, call_timeout: Duration) -> Self {
        Self {
            store,
            notifier,
            call_timeout,
        }
    }

    pub async fn add_asset(&self, raw_id: &str, threshold_percent: f64) -> Result<String, MonitorError> {
        let asset_id = normalize_asset_id(raw_id);
        self.store.upsert_asset(&asset_id, threshold_percent).await?;
        self.announce(&format!(
            "{} added to the watch-list with threshold {}%.",
            display_name(&asset_id),
            threshold_percent
        ))
        .await;
        Ok(asset_id)
    }

    pub async fn remove_asset(&self, raw_id: &str) -> Result<String, MonitorError> {
        let asset_id = normalize_asset_id(raw_id);
        self.store.remove_asset(&asset_id).await?;
        self.announce(&format!(
            "{} removed from the watch-list.",
            display_name(&asset_id)
        ))
        .await;
        Ok(asset_id)
    }

    /// Upsert seed entries that are missing or carry a different threshold.
    /// Returns how many entries changed.
    pub async fn apply_seed(&self, seed: &[(String, f64)]) -> Result<usize, MonitorError> {
        let existing = self.store.list_assets().await?;
        let mut changed = 0;
        for (raw_id, threshold) in seed {
            let asset_id = normalize_asset_id(raw_id);
            let unchanged = existing
                .iter()
                .any(|a| a.asset_id == asset_id && a.threshold_percent == *threshold);
            if !unchanged {
                self.add_asset(&asset_id, *threshold).await?;
                changed += 1;
            }
        }
        Ok(changed)
    }

    pub async fn set_run_threshold_percent(&self, value: f64) -> Result<(), MonitorError> {
        self.store.set_run_threshold_percent(value).await
    }

    pub async fn set_run_consecutive_periods(&self, value: usize) -> Result<(), MonitorError> {
        self.store.set_run_consecutive_periods(value).await
    }

    pub async fn describe_watchlist(&self) -> Result<String, MonitorError> {
        Ok(render_watchlist(&self.store.list_assets().await?))
    }

    async fn announce(&self, text: &str) {
        match tokio::time::timeout(self.call_timeout, self.notifier.notify(text)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Failed to announce watch-list change: {}", e),
            Err(_) => tracing::warn!(
                "Watch-list announcement timed out after {}s",
                self.call_timeout.as_secs_f64()
            ),
        }
    }
}

pub fn render_watchlist(assets: &[WatchedAsset]) -> String {
    if assets.is_empty() {
        return "No assets are currently being watched.".to_string();
    }
    let lines: Vec<String> = assets
        .iter()
        .map(|a| format!("- {} (threshold: {}%)", display_name(&a.asset_id), a.threshold_percent))
        .collect();
    format!("Watched assets:\n{}", lines.join("\n"))
}
