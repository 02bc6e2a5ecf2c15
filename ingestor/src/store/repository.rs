use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::{DailyRecord, Symbol, VolumeSample};

#[async_trait]
pub trait QuoteRepository: Send + Sync {
    /// Symbols with `active = 1`, in code order.
    async fn active_symbols(&self) -> Result<Vec<Symbol>>;

    async fn get_symbol(&self, code: &str) -> Result<Option<Symbol>>;

    /// Insert or refresh name/region/kind/tags. `active` is only written on insert.
    async fn upsert_symbol(&self, symbol: &Symbol) -> Result<()>;

    async fn set_symbol_active(&self, code: &str, active: bool) -> Result<()>;

    /// Up to `n` rows strictly before `before_day`, most recent first.
    async fn recent_records(
        &self,
        symbol: &str,
        n: usize,
        before_day: NaiveDate,
    ) -> Result<Vec<DailyRecord>>;

    async fn get_record(&self, symbol: &str, day: NaiveDate) -> Result<Option<DailyRecord>>;

    /// Get-or-create by `(symbol, day)`. A `None` in `turnover_rate` or
    /// `net_inflow` keeps the stored value.
    async fn upsert_daily(&self, record: &DailyRecord) -> Result<()>;

    /// Sets `turnover_rate` on an existing row whose value is missing or not
    /// positive. Returns whether a row changed.
    async fn fill_turnover_rate(&self, symbol: &str, day: NaiveDate, rate: f64) -> Result<bool>;

    /// Sets `net_inflow` on an existing row that has none yet.
    /// Returns whether a row changed.
    async fn fill_net_inflow(&self, symbol: &str, day: NaiveDate, value: f64) -> Result<bool>;

    async fn append_volume_sample(&self, sample: &VolumeSample) -> Result<()>;

    /// Volumes of up to `n` samples in `bucket` observed before `before_ms`,
    /// most recent first.
    async fn recent_volume_samples(
        &self,
        symbol: &str,
        bucket: &str,
        n: usize,
        before_ms: i64,
    ) -> Result<Vec<i64>>;
}
