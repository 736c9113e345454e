use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use feed_clients::{CoinGeckoClient, CryptoPanicClient};
use notification_service::{NotificationConfig, NotificationService};
use price_store::PriceStore;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use watch_core::{NewsSource, Notifier, PriceSource};

mod config;
mod monitor;
mod news_ledger;
mod watchlist;

use config::WatcherConfig;
use monitor::MonitorLoop;
use watchlist::WatchlistAdmin;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting coin watcher");

    // 2. Configuration
    let config = WatcherConfig::from_env()?;
    tracing::info!("Configuration loaded and validated");
    tracing::info!("  Check interval: {} seconds", config.check_interval_seconds);
    tracing::info!("  Call timeout: {} seconds", config.fetch_timeout_seconds);
    tracing::info!("  Quote currency: {}", config.vs_currency);
    tracing::info!("  Database: {}", config.database_url);

    // 3. Store and notifier
    let store = Arc::new(
        PriceStore::new(&config.database_url)
            .await
            .context("Failed to open price store")?,
    );
    tracing::info!("Price store ready");

    let mut notification_config = NotificationConfig::from_env();
    notification_config.request_timeout = config.fetch_timeout();
    let notifier: Arc<dyn Notifier> = Arc::new(NotificationService::new(&notification_config));

    // 4. Apply startup overrides through the validated admin surface
    let admin = WatchlistAdmin::new(
        Arc::clone(&store),
        Arc::clone(&notifier),
        config.fetch_timeout(),
    );
    if let Some(threshold) = config.run_threshold_percent {
        admin
            .set_run_threshold_percent(threshold)
            .await
            .context("Invalid RUN_THRESHOLD_PERCENT")?;
    }
    if let Some(periods) = config.run_consecutive_periods {
        admin
            .set_run_consecutive_periods(periods)
            .await
            .context("Invalid RUN_CONSECUTIVE_PERIODS")?;
    }
    for asset_id in &config.unwatch {
        admin.remove_asset(asset_id).await?;
    }
    let changed = admin
        .apply_seed(&config.watchlist_seed)
        .await
        .context("Invalid WATCHLIST entry")?;
    if changed > 0 {
        tracing::info!("Applied {} watch-list seed entries", changed);
    }

    // 5. Data sources
    let prices: Arc<dyn PriceSource> = Arc::new(CoinGeckoClient::new(
        &config.coingecko_api_url,
        &config.vs_currency,
        config.fetch_timeout(),
    ));
    let news: Option<Arc<dyn NewsSource>> = match &config.news_api_key {
        Some(key) => Some(Arc::new(CryptoPanicClient::new(
            &config.news_api_url,
            key,
            config.fetch_timeout(),
        ))),
        None => {
            tracing::info!("NEWS_API_KEY not set, news notifications disabled");
            None
        }
    };

    // 6. Startup notification
    let settings = store.run_settings().await?;
    let startup = format!(
        "Coin watcher started\n{}\nRun rule: +{}% over {} intervals | Check interval: {}s",
        admin.describe_watchlist().await?,
        settings.threshold_percent(),
        settings.consecutive_periods(),
        config.check_interval_seconds
    );
    send_status(notifier.as_ref(), &startup, config.fetch_timeout()).await;

    // 7. Graceful shutdown (SIGINT + SIGTERM), honored between cycles
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
        tracing::info!("Shutdown requested, stopping after the current cycle");
        let _ = shutdown_tx.send(true);
    });

    let mut monitor = MonitorLoop::new(
        store,
        prices,
        news,
        Arc::clone(&notifier),
        config.check_interval(),
        config.fetch_timeout(),
    );
    monitor.run(shutdown_rx).await;

    send_status(notifier.as_ref(), "Coin watcher stopped", config.fetch_timeout()).await;
    tracing::info!("Coin watcher shut down after {} cycles.", monitor.cycles_run());
    Ok(())
}

/// Best-effort lifecycle notification, bounded like every other external call.
async fn send_status(notifier: &dyn Notifier, text: &str, timeout: Duration) {
    match tokio::time::timeout(timeout, notifier.notify(text)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Failed to send status notification: {}", e),
        Err(_) => tracing::warn!(
            "Status notification timed out after {}s",
            timeout.as_secs_f64()
        ),
    }
}
