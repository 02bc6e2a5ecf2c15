use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Per-(symbol, day) row carrying prices and the full indicator state.
///
/// Every derived field is a function of the previous days' rows for the
/// same symbol plus the latest quote of `day`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub symbol: String,
    pub day: NaiveDate,
    pub name: String,

    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub prior_close: f64,
    pub volume: i64,
    pub turnover_rate: Option<f64>,

    pub ma5: f64,
    pub ma10: f64,
    pub ma20: f64,

    // MACD
    pub ema_short: f64,
    pub ema_long: f64,
    pub diff: f64,
    pub signal_line: f64,

    // KDJ
    pub kdj_k: f64,
    pub kdj_d: f64,
    pub kdj_j: f64,

    // TRIX
    pub trix_ema1: f64,
    pub trix_ema2: f64,
    pub trix_ema3: f64,
    pub trix: f64,
    pub trix_ma: f64,

    pub boll_upper: f64,
    pub boll_lower: f64,

    pub volume_ratio: f64,
    pub net_inflow: Option<f64>,
}

/// Append-only intraday volume observation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VolumeSample {
    pub symbol: String,
    pub bucket: String,
    pub volume: i64,
    pub price: f64,
    pub observed_ms: i64,
}
