use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use tracing::warn;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string.
    pub database_url: String,

    // =========================
    // Dispatch configuration
    // =========================
    /// Number of symbols per task batch pushed by the dispatcher.
    pub batch_size: usize,

    /// Pause between two batch pushes within one dispatch cycle.
    ///
    /// Spreads a cycle over time so no vendor sees the whole universe
    /// in one burst.
    pub batch_interval: Duration,

    /// Period of the dispatch cycle while the trading window is open.
    pub cycle_interval: Duration,

    // =========================
    // Worker configuration
    // =========================
    /// Number of concurrent workers consuming the task queue.
    pub worker_count: usize,

    /// Maximum number of symbols sent to an adapter in one call.
    /// Larger batches are split into sub-batches by the worker.
    pub adapter_batch_limit: usize,

    /// Parse-failure budget per symbol and cycle. A symbol whose failure
    /// count reaches this value is dropped.
    pub max_retries: u32,

    /// Sleep applied by a worker after a whole-batch transport failure.
    pub transport_backoff: Duration,

    // =========================
    // Upstream / clock
    // =========================
    /// Base URL of the text quote endpoint.
    pub quote_endpoint: String,

    /// Time zone of the exchange whose sessions gate ingestion.
    pub exchange_tz: Tz,

    // =========================
    // Universe maintenance
    // =========================
    /// JSON listing endpoint. The listing sweep is disabled when unset.
    pub listing_endpoint: Option<String>,

    /// Period of the listing sweep.
    pub listing_interval: Duration,

    // =========================
    // Enrichment
    // =========================
    pub enrich_enabled: bool,

    /// Daily history endpoint used for backfill and turnover rates.
    pub history_endpoint: String,

    /// Daily fund-flow endpoint used for net inflow.
    pub fund_flow_endpoint: String,

    pub enrich_interval: Duration,

    /// Calendar days of history loaded for a symbol without stored rows.
    pub history_lookback_days: u32,

    /// Calendar days re-checked for missing turnover on known symbols.
    pub enrich_recent_days: u32,

    /// Pause between two symbols of one enrichment pass.
    pub enrich_pause: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://ingestor_dev.db?mode=rwc".to_string());

        let quote_endpoint =
            std::env::var("QUOTE_ENDPOINT").unwrap_or_else(|_| "https://qt.gtimg.cn".to_string());

        Self {
            database_url,

            // Dispatch defaults:
            // - ~80 symbols per vendor request
            // - one cycle every 20 minutes
            batch_size: env_or("BATCH_SIZE", 80usize).max(1),
            batch_interval: Duration::from_millis(env_or("BATCH_INTERVAL_MS", 1_000u64)),
            cycle_interval: Duration::from_secs(env_or("CYCLE_INTERVAL_SECS", 1_200u64)),

            // Worker defaults:
            worker_count: env_or("WORKER_COUNT", 3usize).max(1),
            adapter_batch_limit: env_or("ADAPTER_BATCH_LIMIT", 80usize).max(1),
            max_retries: env_or("MAX_RETRIES", 5u32).max(1),
            transport_backoff: Duration::from_millis(env_or("TRANSPORT_BACKOFF_MS", 3_000u64)),

            quote_endpoint,
            exchange_tz: env_or("EXCHANGE_TZ", chrono_tz::Asia::Shanghai),

            listing_endpoint: std::env::var("LISTING_ENDPOINT")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            listing_interval: Duration::from_secs(env_or("LISTING_INTERVAL_SECS", 86_400u64)),

            enrich_enabled: env_or("ENRICH_ENABLED", true),
            history_endpoint: std::env::var("HISTORY_ENDPOINT")
                .unwrap_or_else(|_| "https://q.stock.sohu.com".to_string()),
            fund_flow_endpoint: std::env::var("FUND_FLOW_ENDPOINT")
                .unwrap_or_else(|_| "https://push2his.eastmoney.com".to_string()),
            enrich_interval: Duration::from_secs(env_or("ENRICH_INTERVAL_SECS", 86_400u64)),
            history_lookback_days: env_or("HISTORY_LOOKBACK_DAYS", 360u32),
            enrich_recent_days: env_or("ENRICH_RECENT_DAYS", 10u32),
            enrich_pause: Duration::from_millis(env_or("ENRICH_PAUSE_MS", 500u64)),
        }
    }
}

/// Reads `key` from the environment, falling back to `default` when the
/// variable is missing or does not parse.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!(key, value = %raw, "unparseable config value; using default");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_on_garbage() {
        // Unique key so parallel tests never collide.
        let key = "INGESTOR_TEST_ENV_OR_GARBAGE";
        unsafe { std::env::set_var(key, "not-a-number") };
        assert_eq!(env_or(key, 7usize), 7);
        unsafe { std::env::remove_var(key) };
    }

    #[test]
    fn env_or_parses_time_zone() {
        let key = "INGESTOR_TEST_ENV_OR_TZ";
        unsafe { std::env::set_var(key, "America/New_York") };
        assert_eq!(env_or(key, chrono_tz::Asia::Shanghai), chrono_tz::America::New_York);
        unsafe { std::env::remove_var(key) };
    }
}
