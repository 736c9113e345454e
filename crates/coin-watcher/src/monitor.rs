use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alert_detectors::{RunDetector, ThresholdDetector};
use price_store::PriceStore;
use tokio::sync::watch;
use watch_core::{
    fetch_failure_message, AlertEvent, AssetQuote, MonitorError, NewsItem, NewsSource, Notifier,
    PriceSource, RunSettings, WatchedAsset,
};

use crate::news_ledger::NewsLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleOutcome {
    #[default]
    Completed,
    SkippedEmptyWatchlist,
    PriceFetchFailed,
    StoreUnavailable,
}

/// What one cycle did, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub samples_recorded: usize,
    pub alerts_triggered: usize,
    pub news_delivered: usize,
    pub delivery_failures: usize,
}

/// Fetch -> record -> detect -> news -> notify, then sleep; forever.
///
/// Shares the store with `WatchlistAdmin`; the pool's single connection
/// serializes their access. Every external call is bounded by `call_timeout`.
pub struct MonitorLoop {
    store: Arc<PriceStore>,
    prices: Arc<dyn PriceSource>,
    news: Option<Arc<dyn NewsSource>>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
    call_timeout: Duration,
    delivered_news: NewsLedger,
    cycles_run: u64,
}

impl MonitorLoop {
    pub fn new(
        store: Arc<PriceStore>,
        prices: Arc<dyn PriceSource>,
        news: Option<Arc<dyn NewsSource>>,
        notifier: Arc<dyn Notifier>,
        interval: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            prices,
            news,
            notifier,
            interval,
            call_timeout,
            delivered_news: NewsLedger::default(),
            cycles_run: 0,
        }
    }

    pub fn cycles_run(&self) -> u64 {
        self.cycles_run
    }

    /// Run cycles until `shutdown` flips to `true`.
    ///
    /// The flag is checked before each cycle and while sleeping; a cycle in
    /// progress is never interrupted.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "Monitor loop started: interval {}s, call timeout {}s",
            self.interval.as_secs(),
            self.call_timeout.as_secs()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let report = self.run_cycle().await;
            self.log_report(&report);

            if self.sleep_or_shutdown(&mut shutdown).await {
                break;
            }
        }

        tracing::info!("Monitor loop stopped after {} cycles", self.cycles_run);
    }

    /// Returns `true` if shutdown was requested during the sleep.
    async fn sleep_or_shutdown(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let sleep = tokio::time::sleep(self.interval);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                changed = shutdown.changed() => match changed {
                    Ok(()) if *shutdown.borrow() => return true,
                    Ok(()) => continue,
                    Err(_) => {
                        // sender gone: nobody can ask us to stop any more
                        (&mut sleep).await;
                        return false;
                    }
                },
            }
        }
    }

    /// One full cycle. Never fails: every error is logged and folded into the report.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycles_run += 1;
        let mut report = CycleReport::default();

        let assets = match self.store.list_assets().await {
            Ok(assets) => assets,
            Err(e) => {
                tracing::error!("Failed to load watch-list: {}", e);
                report.outcome = CycleOutcome::StoreUnavailable;
                return report;
            }
        };

        if assets.is_empty() {
            tracing::info!("No assets to watch, skipping cycle");
            report.outcome = CycleOutcome::SkippedEmptyWatchlist;
            return report;
        }

        let asset_ids: Vec<String> = assets.iter().map(|a| a.asset_id.clone()).collect();

        // 1. Prices: a failed fetch produces one diagnostic and ends the cycle
        let quotes = match self.fetch_quotes(&asset_ids).await {
            Ok(quotes) => quotes,
            Err(e) => {
                tracing::error!("Error fetching price data: {}", e);
                self.deliver(&fetch_failure_message(&e), &mut report).await;
                report.outcome = CycleOutcome::PriceFetchFailed;
                return report;
            }
        };

        // 2. Record samples, then detect
        let alerts = self.update_and_detect(&assets, &quotes, &mut report).await;
        report.alerts_triggered = alerts.len();

        // 3. News
        let news = self.fetch_news(&asset_ids).await;

        // 4. Notify, one message per alert and per article
        for alert in &alerts {
            self.deliver(&alert.to_string(), &mut report).await;
        }
        for item in &news {
            if self.deliver(&item.to_string(), &mut report).await {
                self.delivered_news.remember(&item.url);
                report.news_delivered += 1;
            }
        }

        report
    }

    async fn fetch_quotes(
        &self,
        asset_ids: &[String],
    ) -> Result<HashMap<String, AssetQuote>, MonitorError> {
        match tokio::time::timeout(self.call_timeout, self.prices.fetch_quotes(asset_ids)).await {
            Ok(result) => result,
            Err(_) => Err(MonitorError::TransientFetch(format!(
                "price request timed out after {}s",
                self.call_timeout.as_secs_f64()
            ))),
        }
    }

    async fn update_and_detect(
        &self,
        assets: &[WatchedAsset],
        quotes: &HashMap<String, AssetQuote>,
        report: &mut CycleReport,
    ) -> Vec<AlertEvent> {
        let settings = match self.store.run_settings().await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Failed to read run settings, using defaults: {}", e);
                RunSettings::default()
            }
        };
        let run_detector = RunDetector::new(settings);
        let mut alerts = Vec::new();

        for asset in assets {
            // providers omit ids they have no data for
            let Some(quote) = quotes.get(&asset.asset_id) else {
                tracing::debug!("No quote for {}, skipping", asset.asset_id);
                continue;
            };

            if let Err(e) = self.store.record_sample(&asset.asset_id, quote.price).await {
                tracing::error!("Failed to record price for {}: {}", asset.asset_id, e);
                continue;
            }
            report.samples_recorded += 1;

            if let Some(alert) = ThresholdDetector::evaluate(
                &asset.asset_id,
                quote.change_24h_percent,
                asset.threshold_percent,
            ) {
                alerts.push(alert);
            }

            match self
                .store
                .recent_samples(&asset.asset_id, run_detector.window())
                .await
            {
                Ok(window) => {
                    if let Some(alert) = run_detector.evaluate(&asset.asset_id, &window) {
                        alerts.push(alert);
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to read history for {}: {}", asset.asset_id, e);
                }
            }
        }

        alerts
    }

    /// New (not yet delivered) articles. Failures count as "no news".
    async fn fetch_news(&self, asset_ids: &[String]) -> Vec<NewsItem> {
        let Some(source) = &self.news else {
            return Vec::new();
        };

        let items = match tokio::time::timeout(self.call_timeout, source.fetch_news(asset_ids)).await {
            Ok(Ok(items)) => items,
            Ok(Err(e)) => {
                tracing::warn!("Error fetching news: {}", e);
                return Vec::new();
            }
            Err(_) => {
                tracing::warn!(
                    "News request timed out after {}s",
                    self.call_timeout.as_secs_f64()
                );
                return Vec::new();
            }
        };

        let total = items.len();
        let mut fresh: Vec<NewsItem> = Vec::with_capacity(total);
        for item in items {
            if !self.delivered_news.contains(&item.url) && !fresh.iter().any(|f| f.url == item.url) {
                fresh.push(item);
            }
        }
        tracing::debug!(
            "News: {} fetched, {} new, {} remembered",
            total,
            fresh.len(),
            self.delivered_news.len()
        );
        fresh
    }

    /// Deliver one message; failures are logged and counted, never retried.
    async fn deliver(&self, text: &str, report: &mut CycleReport) -> bool {
        match tokio::time::timeout(self.call_timeout, self.notifier.notify(text)).await {
            Ok(Ok(())) => {
                tracing::info!("Notification sent: {}", text);
                true
            }
            Ok(Err(e)) => {
                tracing::warn!("Failed to send notification: {}", e);
                report.delivery_failures += 1;
                false
            }
            Err(_) => {
                tracing::warn!(
                    "Notification timed out after {}s",
                    self.call_timeout.as_secs_f64()
                );
                report.delivery_failures += 1;
                false
            }
        }
    }

    fn log_report(&self, report: &CycleReport) {
        match report.outcome {
            CycleOutcome::Completed => tracing::info!(
                "Cycle #{} complete: {} samples, {} alerts, {} news, {} delivery failures",
                self.cycles_run,
                report.samples_recorded,
                report.alerts_triggered,
                report.news_delivered,
                report.delivery_failures
            ),
            other => tracing::info!("Cycle #{} ended early: {:?}", self.cycles_run, other),
        }
    }
}
