use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use watch_core::{
    normalize_asset_id, validate_run_periods, validate_run_threshold, validate_setting,
    MonitorError, PriceSample, RunSettings, WatchedAsset, DEFAULT_RUN_CONSECUTIVE_PERIODS,
    DEFAULT_RUN_THRESHOLD_PERCENT, RUN_CONSECUTIVE_PERIODS_KEY, RUN_THRESHOLD_PERCENT_KEY,
};

fn storage(e: sqlx::Error) -> MonitorError {
    MonitorError::Storage(e.to_string())
}

/// Watch-list, append-only price history and config table behind one SQLite pool.
///
/// The pool holds a single connection, so every read and write (scheduler
/// or admin) goes through the same mutual-exclusion domain.
#[derive(Clone)]
pub struct PriceStore {
    pool: SqlitePool,
}

impl PriceStore {
    /// Open (or create) the database and apply the schema.
    pub async fn new(database_url: &str) -> Result<Self, MonitorError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(storage)?
            .create_if_missing(true);

        // Idle/lifetime limits off: an in-memory database lives only as long as its connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await
            .map_err(storage)?;

        let store = Self { pool };
        store.init_schema().await?;

        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), MonitorError> {
        let schema = include_str!("../schema.sql");

        // sqlx executes one statement per query
        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt)
                    .execute(&self.pool)
                    .await
                    .map_err(storage)?;
            }
        }

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ======== Watch-list ========

    /// Insert or replace the watch entry for `asset_id`. Idempotent.
    pub async fn upsert_asset(&self, asset_id: &str, threshold_percent: f64) -> Result<(), MonitorError> {
        let asset_id = normalize_asset_id(asset_id);
        if asset_id.is_empty() {
            return Err(MonitorError::Configuration("Asset id must not be empty".into()));
        }
        if !threshold_percent.is_finite() || threshold_percent <= 0.0 {
            return Err(MonitorError::Configuration(format!(
                "Threshold for {} must be a positive number, got {}",
                asset_id, threshold_percent
            )));
        }

        sqlx::query(
            "INSERT INTO watched_assets (asset_id, threshold) VALUES (?, ?)
             ON CONFLICT(asset_id) DO UPDATE SET threshold = excluded.threshold",
        )
        .bind(&asset_id)
        .bind(threshold_percent)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        tracing::info!("Watching {} with threshold {}%", asset_id, threshold_percent);
        Ok(())
    }

    /// Delete the watch entry if present. Removing an unknown asset is not an error.
    pub async fn remove_asset(&self, asset_id: &str) -> Result<(), MonitorError> {
        let asset_id = normalize_asset_id(asset_id);
        let result = sqlx::query("DELETE FROM watched_assets WHERE asset_id = ?")
            .bind(&asset_id)
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        if result.rows_affected() == 0 {
            tracing::debug!("Remove requested for unwatched asset {}", asset_id);
        } else {
            tracing::info!("Stopped watching {}", asset_id);
        }
        Ok(())
    }

    pub async fn list_assets(&self) -> Result<Vec<WatchedAsset>, MonitorError> {
        let rows: Vec<(String, f64)> =
            sqlx::query_as("SELECT asset_id, threshold FROM watched_assets ORDER BY asset_id")
                .fetch_all(&self.pool)
                .await
                .map_err(storage)?;

        Ok(rows
            .into_iter()
            .map(|(asset_id, threshold_percent)| WatchedAsset {
                asset_id,
                threshold_percent,
            })
            .collect())
    }

    // ======== Price history ========

    /// Append one sample stamped with the current time.
    pub async fn record_sample(&self, asset_id: &str, price: f64) -> Result<(), MonitorError> {
        self.append_sample(&PriceSample::now(normalize_asset_id(asset_id), price))
            .await
    }

    /// Append a sample. Recency is insertion order; the timestamp is stored
    /// as recorded and never used for ordering.
    pub async fn append_sample(&self, sample: &PriceSample) -> Result<(), MonitorError> {
        if !sample.price.is_finite() || sample.price < 0.0 {
            return Err(MonitorError::MalformedResponse(format!(
                "Refusing to record price {} for {}",
                sample.price, sample.asset_id
            )));
        }

        sqlx::query("INSERT INTO price_history (asset_id, recorded_at, price) VALUES (?, ?, ?)")
            .bind(&sample.asset_id)
            .bind(sample.timestamp.timestamp_millis())
            .bind(sample.price)
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        Ok(())
    }

    /// Up to `n` most recent prices for `asset_id`, most recent first.
    pub async fn recent_samples(&self, asset_id: &str, n: usize) -> Result<Vec<f64>, MonitorError> {
        Ok(self
            .recent_history(asset_id, n)
            .await?
            .into_iter()
            .map(|s| s.price)
            .collect())
    }

    /// Like [`recent_samples`](Self::recent_samples) but with timestamps.
    pub async fn recent_history(&self, asset_id: &str, n: usize) -> Result<Vec<PriceSample>, MonitorError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let asset_id = normalize_asset_id(asset_id);
        let limit = i64::try_from(n).unwrap_or(i64::MAX);

        // insertion order defines recency; wall-clock time may step backwards
        let rows: Vec<(i64, f64)> = sqlx::query_as(
            "SELECT recorded_at, price FROM price_history
             WHERE asset_id = ?
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(&asset_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        Ok(rows
            .into_iter()
            .map(|(millis, price)| PriceSample {
                asset_id: asset_id.clone(),
                timestamp: DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default(),
                price,
            })
            .collect())
    }

    // ======== Config ========

    /// Raw numeric value for `key`, or `None` when unset.
    pub async fn get_config(&self, key: &str) -> Result<Option<f64>, MonitorError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM config WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;

        Ok(row.and_then(|(value,)| match value.trim().parse::<f64>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring unparseable config value {}={:?}", key, value);
                None
            }
        }))
    }

    /// Validate and persist a config value. Invalid values never reach the table.
    pub async fn set_config(&self, key: &str, value: f64) -> Result<(), MonitorError> {
        validate_setting(key, value)?;

        sqlx::query(
            "INSERT INTO config (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        tracing::info!("Configuration updated: {} = {}", key, value);
        Ok(())
    }

    pub async fn set_run_threshold_percent(&self, value: f64) -> Result<(), MonitorError> {
        validate_run_threshold(value)?;
        self.set_config(RUN_THRESHOLD_PERCENT_KEY, value).await
    }

    pub async fn set_run_consecutive_periods(&self, value: usize) -> Result<(), MonitorError> {
        validate_run_periods(value)?;
        self.set_config(RUN_CONSECUTIVE_PERIODS_KEY, value as f64).await
    }

    pub async fn run_threshold_percent(&self) -> Result<f64, MonitorError> {
        Ok(match self.get_config(RUN_THRESHOLD_PERCENT_KEY).await? {
            Some(v) if validate_run_threshold(v).is_ok() => v,
            Some(v) => {
                tracing::warn!(
                    "Stored {} = {} is invalid, using default {}",
                    RUN_THRESHOLD_PERCENT_KEY,
                    v,
                    DEFAULT_RUN_THRESHOLD_PERCENT
                );
                DEFAULT_RUN_THRESHOLD_PERCENT
            }
            None => DEFAULT_RUN_THRESHOLD_PERCENT,
        })
    }

    pub async fn run_consecutive_periods(&self) -> Result<usize, MonitorError> {
        Ok(match self.get_config(RUN_CONSECUTIVE_PERIODS_KEY).await? {
            Some(v) if validate_setting(RUN_CONSECUTIVE_PERIODS_KEY, v).is_ok() => v as usize,
            Some(v) => {
                tracing::warn!(
                    "Stored {} = {} is invalid, using default {}",
                    RUN_CONSECUTIVE_PERIODS_KEY,
                    v,
                    DEFAULT_RUN_CONSECUTIVE_PERIODS
                );
                DEFAULT_RUN_CONSECUTIVE_PERIODS
            }
            None => DEFAULT_RUN_CONSECUTIVE_PERIODS,
        })
    }

    /// Both run parameters, defaults applied.
    pub async fn run_settings(&self) -> Result<RunSettings, MonitorError> {
        let threshold = self.run_threshold_percent().await?;
        let periods = self.run_consecutive_periods().await?;
        RunSettings::new(threshold, periods)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    async fn setup_test_store() -> PriceStore {
        PriceStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_store_creation() {
        let store = setup_test_store().await;
        assert!(store.pool().acquire().await.is_ok());
        assert!(store.list_assets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = setup_test_store().await;
        store.upsert_asset("bitcoin", 5.0).await.unwrap();
        store.upsert_asset("bitcoin", 5.0).await.unwrap();

        let assets = store.list_assets().await.unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].asset_id, "bitcoin");
        assert_eq!(assets[0].threshold_percent, 5.0);
    }

    #[tokio::test]
    async fn test_upsert_replaces_threshold_and_normalizes() {
        let store = setup_test_store().await;
        store.upsert_asset("Bitcoin", 5.0).await.unwrap();
        store.upsert_asset(" BITCOIN ", 8.0).await.unwrap();

        let assets = store.list_assets().await.unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].asset_id, "bitcoin");
        assert_eq!(assets[0].threshold_percent, 8.0);
    }

    #[tokio::test]
    async fn test_upsert_rejects_invalid_input() {
        let store = setup_test_store().await;
        assert!(matches!(
            store.upsert_asset("bitcoin", 0.0).await,
            Err(MonitorError::Configuration(_))
        ));
        assert!(matches!(
            store.upsert_asset("bitcoin", -2.0).await,
            Err(MonitorError::Configuration(_))
        ));
        assert!(matches!(
            store.upsert_asset("   ", 5.0).await,
            Err(MonitorError::Configuration(_))
        ));
        assert!(store.list_assets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_asset() {
        let store = setup_test_store().await;
        store.upsert_asset("bitcoin", 5.0).await.unwrap();
        store.upsert_asset("ethereum", 7.0).await.unwrap();

        store.remove_asset("bitcoin").await.unwrap();
        // absent asset is fine
        store.remove_asset("dogecoin").await.unwrap();

        let assets = store.list_assets().await.unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].asset_id, "ethereum");
    }

    #[tokio::test]
    async fn test_recent_samples_most_recent_first() {
        let store = setup_test_store().await;
        let start = Utc::now() - ChronoDuration::hours(10);
        for (i, price) in [100.0, 105.0, 110.0, 115.0, 120.0].into_iter().enumerate() {
            store
                .append_sample(&PriceSample {
                    asset_id: "ether".into(),
                    timestamp: start + ChronoDuration::hours(i as i64),
                    price,
                })
                .await
                .unwrap();
        }

        let recent = store.recent_samples("ether", 3).await.unwrap();
        assert_eq!(recent, vec![120.0, 115.0, 110.0]);

        let history = store.recent_history("ether", 10).await.unwrap();
        assert_eq!(history.len(), 5);
        assert!(history.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_recent_samples_follow_insertion_order_when_clock_steps_back() {
        let store = setup_test_store().await;
        let now = Utc::now();
        for (offset_secs, price) in [(0, 100.0), (60, 101.0), (-30, 102.0)] {
            store
                .append_sample(&PriceSample {
                    asset_id: "bitcoin".into(),
                    timestamp: now + ChronoDuration::seconds(offset_secs),
                    price,
                })
                .await
                .unwrap();
        }

        let recent = store.recent_samples("bitcoin", 3).await.unwrap();
        assert_eq!(recent, vec![102.0, 101.0, 100.0]);
    }

    #[tokio::test]
    async fn test_recent_samples_short_history() {
        let store = setup_test_store().await;
        store.record_sample("bitcoin", 100.0).await.unwrap();
        store.record_sample("bitcoin", 101.0).await.unwrap();
        store.record_sample("ethereum", 3000.0).await.unwrap();

        let recent = store.recent_samples("bitcoin", 5).await.unwrap();
        assert_eq!(recent, vec![101.0, 100.0]);
        assert!(store.recent_samples("bitcoin", 0).await.unwrap().is_empty());
        assert!(store.recent_samples("solana", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_sample_rejects_negative_price() {
        let store = setup_test_store().await;
        assert!(store.record_sample("bitcoin", -1.0).await.is_err());
        assert!(store.record_sample("bitcoin", f64::NAN).await.is_err());
        store.record_sample("bitcoin", 0.0).await.unwrap();
        assert_eq!(store.recent_samples("bitcoin", 5).await.unwrap(), vec![0.0]);
    }

    #[tokio::test]
    async fn test_config_round_trip_and_defaults() {
        let store = setup_test_store().await;
        assert_eq!(store.get_config(RUN_THRESHOLD_PERCENT_KEY).await.unwrap(), None);
        assert_eq!(store.run_settings().await.unwrap(), RunSettings::default());

        store.set_config(RUN_THRESHOLD_PERCENT_KEY, 15.0).await.unwrap();
        store.set_run_consecutive_periods(7).await.unwrap();

        assert_eq!(store.get_config(RUN_THRESHOLD_PERCENT_KEY).await.unwrap(), Some(15.0));
        assert_eq!(store.run_threshold_percent().await.unwrap(), 15.0);
        assert_eq!(store.run_consecutive_periods().await.unwrap(), 7);

        let settings = store.run_settings().await.unwrap();
        assert_eq!(settings.threshold_percent(), 15.0);
        assert_eq!(settings.consecutive_periods(), 7);
    }

    #[tokio::test]
    async fn test_invalid_config_never_stored() {
        let store = setup_test_store().await;
        assert!(store.set_run_consecutive_periods(0).await.is_err());
        assert!(store.set_run_consecutive_periods(1).await.is_err());
        assert!(store.set_run_threshold_percent(-5.0).await.is_err());
        assert!(store.set_config("unknown_key", 3.0).await.is_err());

        assert_eq!(store.get_config(RUN_CONSECUTIVE_PERIODS_KEY).await.unwrap(), None);
        assert_eq!(store.get_config(RUN_THRESHOLD_PERCENT_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_config_falls_back_to_default() {
        let store = setup_test_store().await;
        sqlx::query("INSERT INTO config (key, value, updated_at) VALUES (?, ?, ?)")
            .bind(RUN_CONSECUTIVE_PERIODS_KEY)
            .bind("lots")
            .bind(Utc::now().to_rfc3339())
            .execute(store.pool())
            .await
            .unwrap();

        assert_eq!(store.get_config(RUN_CONSECUTIVE_PERIODS_KEY).await.unwrap(), None);
        assert_eq!(store.run_consecutive_periods().await.unwrap(), 5);
    }
}
