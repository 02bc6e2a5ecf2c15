use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{AnyPool, Row};

use crate::model::{DailyRecord, Region, Symbol, VolumeSample};
use crate::store::repository::QuoteRepository;
use crate::time::now_ms;

const DAY_FORMAT: &str = "%Y-%m-%d";

const RECORD_COLUMNS: &str = r#"
  symbol, day, name, open, high, low,
  close, prior_close, volume, turnover_rate, ma5, ma10,
  ma20, ema_short, ema_long, diff, signal_line, kdj_k,
  kdj_d, kdj_j, trix_ema1, trix_ema2, trix_ema3, trix,
  trix_ma, boll_upper, boll_lower, volume_ratio, net_inflow
"#;

const UPSERT_DAILY: &str = r#"
INSERT INTO daily_records (
  symbol, day, name, open, high, low,
  close, prior_close, volume, turnover_rate, ma5, ma10,
  ma20, ema_short, ema_long, diff, signal_line, kdj_k,
  kdj_d, kdj_j, trix_ema1, trix_ema2, trix_ema3, trix,
  trix_ma, boll_upper, boll_lower, volume_ratio, net_inflow, updated_ms
)
VALUES (
  ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
  ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
  ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
)
ON CONFLICT(symbol, day) DO UPDATE SET
  name = excluded.name,
  open = excluded.open,
  high = excluded.high,
  low = excluded.low,
  close = excluded.close,
  prior_close = excluded.prior_close,
  volume = excluded.volume,
  turnover_rate = COALESCE(excluded.turnover_rate, daily_records.turnover_rate),
  ma5 = excluded.ma5,
  ma10 = excluded.ma10,
  ma20 = excluded.ma20,
  ema_short = excluded.ema_short,
  ema_long = excluded.ema_long,
  diff = excluded.diff,
  signal_line = excluded.signal_line,
  kdj_k = excluded.kdj_k,
  kdj_d = excluded.kdj_d,
  kdj_j = excluded.kdj_j,
  trix_ema1 = excluded.trix_ema1,
  trix_ema2 = excluded.trix_ema2,
  trix_ema3 = excluded.trix_ema3,
  trix = excluded.trix,
  trix_ma = excluded.trix_ma,
  boll_upper = excluded.boll_upper,
  boll_lower = excluded.boll_lower,
  volume_ratio = excluded.volume_ratio,
  net_inflow = COALESCE(excluded.net_inflow, daily_records.net_inflow),
  updated_ms = excluded.updated_ms;
"#;

/// SQLx-backed implementation of QuoteRepository.
/// Responsible only for persistence and row mapping.
pub struct SqlxQuoteRepository {
    pool: AnyPool,
}

impl SqlxQuoteRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuoteRepository for SqlxQuoteRepository {
    async fn active_symbols(&self) -> anyhow::Result<Vec<Symbol>> {
        let rows = sqlx::query(
            r#"
SELECT code, name, region, kind, active, tags
FROM symbols
WHERE active = 1
ORDER BY code;
"#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            match row_to_symbol(&r) {
                Ok(s) => out.push(s),
                Err(e) => {
                    // poison-row resilience: skip but don't fail the cycle
                    tracing::warn!(error = %e, "skipping malformed symbol row");
                }
            }
        }

        Ok(out)
    }

    async fn get_symbol(&self, code: &str) -> anyhow::Result<Option<Symbol>> {
        let row = sqlx::query(
            r#"
SELECT code, name, region, kind, active, tags
FROM symbols
WHERE code = ?;
"#,
        )
        .bind(code.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_symbol(&r)?)),
            None => Ok(None),
        }
    }

    async fn upsert_symbol(&self, symbol: &Symbol) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO symbols (code, name, region, kind, active, tags, updated_ms)
VALUES (?, ?, ?, ?, ?, ?, ?)
ON CONFLICT(code) DO UPDATE SET
  name = excluded.name,
  region = excluded.region,
  kind = excluded.kind,
  tags = excluded.tags,
  updated_ms = excluded.updated_ms;
"#,
        )
        .bind(symbol.code.clone())
        .bind(symbol.name.clone())
        .bind(symbol.region.as_str().to_string())
        .bind(symbol.kind.clone())
        .bind(symbol.active as i64)
        .bind(symbol.tags.clone())
        .bind(u64_to_i64(now_ms())?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_symbol_active(&self, code: &str, active: bool) -> anyhow::Result<()> {
        let res = sqlx::query(
            r#"
UPDATE symbols
SET active = ?, updated_ms = ?
WHERE code = ?;
"#,
        )
        .bind(active as i64)
        .bind(u64_to_i64(now_ms())?)
        .bind(code.to_string())
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return Err(anyhow!("unknown symbol: {code}"));
        }

        Ok(())
    }

    async fn recent_records(
        &self,
        symbol: &str,
        n: usize,
        before_day: NaiveDate,
    ) -> anyhow::Result<Vec<DailyRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM daily_records WHERE symbol = ? AND day < ? ORDER BY day DESC LIMIT ?;"
        );
        let rows = sqlx::query(&sql)
            .bind(symbol.to_string())
            .bind(before_day.format(DAY_FORMAT).to_string())
            .bind(n as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            match row_to_record(&r) {
                Ok(rec) => out.push(rec),
                Err(e) => {
                    tracing::warn!(symbol, error = %e, "skipping malformed daily record");
                }
            }
        }

        Ok(out)
    }

    async fn get_record(&self, symbol: &str, day: NaiveDate) -> anyhow::Result<Option<DailyRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM daily_records WHERE symbol = ? AND day = ?;");
        let row = sqlx::query(&sql)
            .bind(symbol.to_string())
            .bind(day.format(DAY_FORMAT).to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(Some(row_to_record(&r)?)),
            None => Ok(None),
        }
    }

    async fn upsert_daily(&self, r: &DailyRecord) -> anyhow::Result<()> {
        sqlx::query(UPSERT_DAILY)
            .bind(r.symbol.clone())
            .bind(r.day.format(DAY_FORMAT).to_string())
            .bind(r.name.clone())
            .bind(r.open)
            .bind(r.high)
            .bind(r.low)
            .bind(r.close)
            .bind(r.prior_close)
            .bind(r.volume)
            .bind(r.turnover_rate)
            .bind(r.ma5)
            .bind(r.ma10)
            .bind(r.ma20)
            .bind(r.ema_short)
            .bind(r.ema_long)
            .bind(r.diff)
            .bind(r.signal_line)
            .bind(r.kdj_k)
            .bind(r.kdj_d)
            .bind(r.kdj_j)
            .bind(r.trix_ema1)
            .bind(r.trix_ema2)
            .bind(r.trix_ema3)
            .bind(r.trix)
            .bind(r.trix_ma)
            .bind(r.boll_upper)
            .bind(r.boll_lower)
            .bind(r.volume_ratio)
            .bind(r.net_inflow)
            .bind(u64_to_i64(now_ms())?)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn fill_turnover_rate(
        &self,
        symbol: &str,
        day: NaiveDate,
        rate: f64,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
UPDATE daily_records
SET turnover_rate = ?, updated_ms = ?
WHERE symbol = ? AND day = ? AND (turnover_rate IS NULL OR turnover_rate <= 0);
"#,
        )
        .bind(rate)
        .bind(u64_to_i64(now_ms())?)
        .bind(symbol.to_string())
        .bind(day.format(DAY_FORMAT).to_string())
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() > 0)
    }

    async fn fill_net_inflow(
        &self,
        symbol: &str,
        day: NaiveDate,
        value: f64,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
UPDATE daily_records
SET net_inflow = ?, updated_ms = ?
WHERE symbol = ? AND day = ? AND net_inflow IS NULL;
"#,
        )
        .bind(value)
        .bind(u64_to_i64(now_ms())?)
        .bind(symbol.to_string())
        .bind(day.format(DAY_FORMAT).to_string())
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() > 0)
    }

    async fn append_volume_sample(&self, s: &VolumeSample) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO volume_samples (symbol, bucket, volume, price, observed_ms)
VALUES (?, ?, ?, ?, ?);
"#,
        )
        .bind(s.symbol.clone())
        .bind(s.bucket.clone())
        .bind(s.volume)
        .bind(s.price)
        .bind(s.observed_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_volume_samples(
        &self,
        symbol: &str,
        bucket: &str,
        n: usize,
        before_ms: i64,
    ) -> anyhow::Result<Vec<i64>> {
        let rows = sqlx::query(
            r#"
SELECT volume
FROM volume_samples
WHERE symbol = ? AND bucket = ? AND observed_ms < ?
ORDER BY observed_ms DESC
LIMIT ?;
"#,
        )
        .bind(symbol.to_string())
        .bind(bucket.to_string())
        .bind(before_ms)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await?;

        let volumes = rows
            .iter()
            .map(|r| r.try_get::<i64, _>("volume"))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(volumes)
    }
}

/* =========================
Row mapping + conversions
========================= */

fn row_to_symbol(r: &sqlx::any::AnyRow) -> anyhow::Result<Symbol> {
    Ok(Symbol {
        code: r.try_get("code")?,
        name: r.try_get("name")?,
        region: Region::parse(&r.try_get::<String, _>("region")?),
        kind: r.try_get("kind")?,
        active: r.try_get::<i64, _>("active")? == 1,
        tags: r.try_get::<Option<String>, _>("tags")?,
    })
}

fn row_to_record(r: &sqlx::any::AnyRow) -> anyhow::Result<DailyRecord> {
    let day_str: String = r.try_get("day")?;
    let day = NaiveDate::parse_from_str(&day_str, DAY_FORMAT)
        .with_context(|| format!("invalid day: {day_str}"))?;

    Ok(DailyRecord {
        symbol: r.try_get("symbol")?,
        day,
        name: r.try_get("name")?,
        open: r.try_get("open")?,
        high: r.try_get("high")?,
        low: r.try_get("low")?,
        close: r.try_get("close")?,
        prior_close: r.try_get("prior_close")?,
        volume: r.try_get("volume")?,
        turnover_rate: r.try_get::<Option<f64>, _>("turnover_rate")?,
        ma5: r.try_get("ma5")?,
        ma10: r.try_get("ma10")?,
        ma20: r.try_get("ma20")?,
        ema_short: r.try_get("ema_short")?,
        ema_long: r.try_get("ema_long")?,
        diff: r.try_get("diff")?,
        signal_line: r.try_get("signal_line")?,
        kdj_k: r.try_get("kdj_k")?,
        kdj_d: r.try_get("kdj_d")?,
        kdj_j: r.try_get("kdj_j")?,
        trix_ema1: r.try_get("trix_ema1")?,
        trix_ema2: r.try_get("trix_ema2")?,
        trix_ema3: r.try_get("trix_ema3")?,
        trix: r.try_get("trix")?,
        trix_ma: r.try_get("trix_ma")?,
        boll_upper: r.try_get("boll_upper")?,
        boll_lower: r.try_get("boll_lower")?,
        volume_ratio: r.try_get("volume_ratio")?,
        net_inflow: r.try_get::<Option<f64>, _>("net_inflow")?,
    })
}

fn u64_to_i64(v: u64) -> anyhow::Result<i64> {
    if v > i64::MAX as u64 {
        return Err(anyhow!("u64 too large for i64: {v}"));
    }
    Ok(v as i64)
}
