//! Per-symbol enrichment from secondary daily sources.
//!
//! A pass over the active universe does three things for each symbol:
//! - a symbol with no stored rows is backfilled from daily history, oldest
//!   first, through the same upsert path as live quotes, so its indicator
//!   state starts from real data instead of the neutral seed
//! - missing turnover rates of recent closed days are filled from history
//! - missing net inflows of closed days are filled from the fund-flow source
//!
//! Fills never overwrite a stored value. Every read and write goes through
//! the write queue.

pub mod eastmoney;
pub mod sohu;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, NaiveDate, NaiveTime};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, instrument, warn};

use crate::config::AppConfig;
use crate::model::{CanonicalQuote, SymbolRef};
use crate::store::WriteQueue;
use crate::store::writer::volume_sample_for;
use crate::time::{Clock, ExchangeClock};

pub use eastmoney::EastmoneyFundFlow;
pub use sohu::SohuHistory;

/// Bars below this volume are untraded days and are skipped.
const MIN_TRADED_VOLUME: i64 = 2;

/// One closed trading day from a history source.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryBar {
    pub day: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub turnover_rate: Option<f64>,
}

impl HistoryBar {
    /// The bar as a quote stamped at the close of its day.
    pub fn to_quote(&self, symbol: &SymbolRef, prior_close: f64) -> CanonicalQuote {
        let close_time = NaiveTime::from_hms_opt(15, 0, 0).unwrap_or(NaiveTime::MIN);
        CanonicalQuote {
            symbol: symbol.code.clone(),
            name: symbol.name.clone(),
            day: self.day,
            observed_at: self.day.and_time(close_time),
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            prior_close,
            volume: self.volume,
            turnover_rate: self.turnover_rate,
        }
    }
}

/// Daily net capital inflow, in units of 10k CNY.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FundFlowEntry {
    pub day: NaiveDate,
    pub net_inflow: f64,
}

#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Closed days in `[since, until]`, oldest first.
    async fn daily_history(
        &self,
        symbol: &SymbolRef,
        since: NaiveDate,
        until: NaiveDate,
    ) -> anyhow::Result<Vec<HistoryBar>>;
}

#[async_trait]
pub trait FundFlowSource: Send + Sync {
    async fn fund_flow(&self, symbol: &SymbolRef) -> anyhow::Result<Vec<FundFlowEntry>>;
}

#[derive(Clone, Copy, Debug)]
pub struct EnrichConfig {
    /// Days of history fetched for a symbol without stored rows.
    pub lookback_days: u32,
    /// Days re-checked for missing turnover on known symbols.
    pub recent_days: u32,
    /// Pause between two symbols of one pass.
    pub pause: Duration,
}

impl From<&AppConfig> for EnrichConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            lookback_days: cfg.history_lookback_days,
            recent_days: cfg.enrich_recent_days,
            pause: cfg.enrich_pause,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnrichSummary {
    pub backfilled: usize,
    pub history_rows: usize,
    pub turnover_filled: usize,
    pub inflow_filled: usize,
    pub failed: usize,
}

impl EnrichSummary {
    fn absorb(&mut self, other: EnrichSummary) {
        self.backfilled += other.backfilled;
        self.history_rows += other.history_rows;
        self.turnover_filled += other.turnover_filled;
        self.inflow_filled += other.inflow_filled;
        self.failed += other.failed;
    }
}

pub struct Enricher {
    history: Arc<dyn HistorySource>,
    fund_flow: Arc<dyn FundFlowSource>,
    writer: WriteQueue,
    clock: ExchangeClock,
    cfg: EnrichConfig,
}

impl Enricher {
    pub fn new(
        history: Arc<dyn HistorySource>,
        fund_flow: Arc<dyn FundFlowSource>,
        writer: WriteQueue,
        clock: ExchangeClock,
        cfg: EnrichConfig,
    ) -> Self {
        Self {
            history,
            fund_flow,
            writer,
            clock,
            cfg,
        }
    }

    /// One pass over the active universe. A failing symbol is counted and
    /// skipped; only failing to read the universe fails the pass.
    #[instrument(skip(self), name = "enrich_pass")]
    pub async fn run_once(&self, today: NaiveDate) -> anyhow::Result<EnrichSummary> {
        let symbols = self
            .writer
            .submit(|repo| async move { repo.active_symbols().await })
            .await?;

        let mut summary = EnrichSummary::default();
        for (i, symbol) in symbols.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.cfg.pause).await;
            }

            match self.enrich_symbol(&symbol.to_ref(), today).await {
                Ok(s) => summary.absorb(s),
                Err(e) => {
                    summary.failed += 1;
                    warn!(symbol = %symbol.code, error = ?e, "enrichment failed");
                }
            }
        }

        info!(
            symbols = symbols.len(),
            backfilled = summary.backfilled,
            history_rows = summary.history_rows,
            turnover_filled = summary.turnover_filled,
            inflow_filled = summary.inflow_filled,
            failed = summary.failed,
            "enrichment pass finished"
        );

        Ok(summary)
    }

    #[instrument(skip_all, fields(symbol = %symbol.code))]
    pub async fn enrich_symbol(
        &self,
        symbol: &SymbolRef,
        today: NaiveDate,
    ) -> anyhow::Result<EnrichSummary> {
        let mut out = EnrichSummary::default();

        if self.has_rows(&symbol.code, today).await? {
            let since = days_before(today, self.cfg.recent_days);
            let bars = self.history.daily_history(symbol, since, today).await?;
            out.turnover_filled = self.fill_turnover(&symbol.code, &bars, today).await?;
        } else {
            out.history_rows = self.backfill(symbol, today).await?;
            out.backfilled = usize::from(out.history_rows > 0);
        }

        let flows = self.fund_flow.fund_flow(symbol).await?;
        out.inflow_filled = self.fill_inflow(&symbol.code, &flows, today).await?;

        Ok(out)
    }

    /// Replays closed days before `today` as quotes, oldest first.
    /// Returns the number of rows written.
    pub async fn backfill(&self, symbol: &SymbolRef, today: NaiveDate) -> anyhow::Result<usize> {
        let since = days_before(today, self.cfg.lookback_days);
        let mut bars = self.history.daily_history(symbol, since, today).await?;
        bars.sort_by_key(|b| b.day);

        let mut prior_close: Option<f64> = None;
        let mut written = 0usize;

        for bar in bars
            .iter()
            .filter(|b| b.day >= since && b.day < today && b.volume >= MIN_TRADED_VOLUME)
        {
            let quote = bar.to_quote(symbol, prior_close.unwrap_or(bar.open));
            prior_close = Some(bar.close);

            let sample = volume_sample_for(&quote, &self.clock);
            self.writer.upsert_quote(quote, &self.clock).await?;
            self.writer.append_volume_sample(sample).await?;
            written += 1;
        }

        if written > 0 {
            info!(symbol = %symbol.code, rows = written, "history backfilled");
        }
        Ok(written)
    }

    async fn has_rows(&self, code: &str, today: NaiveDate) -> anyhow::Result<bool> {
        let code = code.to_string();
        let until = today.succ_opt().unwrap_or(today);

        let found = self
            .writer
            .submit(move |repo| async move {
                let rows = repo.recent_records(&code, 1, until).await?;
                Ok::<_, anyhow::Error>(!rows.is_empty())
            })
            .await?;

        Ok(found)
    }

    async fn fill_turnover(
        &self,
        code: &str,
        bars: &[HistoryBar],
        today: NaiveDate,
    ) -> anyhow::Result<usize> {
        let updates: Vec<(NaiveDate, f64)> = bars
            .iter()
            .filter(|b| b.day < today)
            .filter_map(|b| b.turnover_rate.filter(|r| *r > 0.0).map(|r| (b.day, r)))
            .collect();
        if updates.is_empty() {
            return Ok(0);
        }

        let code = code.to_string();
        let filled = self
            .writer
            .submit(move |repo| async move {
                let mut n = 0usize;
                for (day, rate) in updates {
                    if repo.fill_turnover_rate(&code, day, rate).await? {
                        n += 1;
                    }
                }
                Ok::<_, anyhow::Error>(n)
            })
            .await?;

        Ok(filled)
    }

    /// Only closed days are filled; today's flow is still moving.
    async fn fill_inflow(
        &self,
        code: &str,
        flows: &[FundFlowEntry],
        today: NaiveDate,
    ) -> anyhow::Result<usize> {
        let updates: Vec<FundFlowEntry> = flows.iter().filter(|f| f.day < today).copied().collect();
        if updates.is_empty() {
            return Ok(0);
        }

        let code = code.to_string();
        let filled = self
            .writer
            .submit(move |repo| async move {
                let mut n = 0usize;
                for f in updates {
                    if repo.fill_net_inflow(&code, f.day, f.net_inflow).await? {
                        n += 1;
                    }
                }
                Ok::<_, anyhow::Error>(n)
            })
            .await?;

        Ok(filled)
    }

    /// Periodic loop; the first pass runs immediately.
    pub async fn run(self: Arc<Self>, every: Duration) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            component = "enricher",
            event = "startup",
            every_s = every.as_secs(),
            "Enricher started"
        );

        loop {
            ticker.tick().await;

            let today = self.clock.now().date();
            if let Err(e) = self.run_once(today).await {
                error!(error = ?e, "enrichment pass failed");
            }
        }
    }
}

fn days_before(day: NaiveDate, n: u32) -> NaiveDate {
    day.checked_sub_days(Days::new(u64::from(n))).unwrap_or(day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_becomes_a_quote_at_the_close() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let bar = HistoryBar {
            day,
            open: 9.9,
            high: 10.4,
            low: 9.8,
            close: 10.2,
            volume: 12_000,
            turnover_rate: Some(1.1),
        };

        let q = bar.to_quote(&SymbolRef::new("600519", "Kweichow Moutai"), 9.95);
        assert_eq!(q.observed_at, day.and_hms_opt(15, 0, 0).unwrap());
        assert_eq!(q.prior_close, 9.95);
        assert_eq!(q.name, "Kweichow Moutai");
        assert_eq!(q.turnover_rate, Some(1.1));
    }

    #[test]
    fn lookback_counts_calendar_days() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        assert_eq!(days_before(day, 10), NaiveDate::from_ymd_opt(2024, 2, 23).unwrap());
        assert_eq!(days_before(day, 0), day);
    }
}
