use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::ParseErrorKind;
use crate::model::task::TaskItem;

/// Vendor-independent snapshot of one symbol's trading day so far.
///
/// `observed_at` is exchange-local time of the snapshot; it drives the
/// intraday volume bucket and the elapsed-session scaling of the volume ratio.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanonicalQuote {
    pub symbol: String,
    pub name: String,
    pub day: NaiveDate,
    pub observed_at: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub prior_close: f64,
    /// Cumulative traded volume for the day, in lots.
    pub volume: i64,
    pub turnover_rate: Option<f64>,
}

/// Per-symbol result of parsing an adapter payload.
#[derive(Clone, Debug, PartialEq)]
pub enum QuoteResult {
    Parsed(CanonicalQuote),
    Failed { item: TaskItem, kind: ParseErrorKind },
}

/// Outcome of one successful adapter call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FetchOutcome {
    pub quotes: Vec<CanonicalQuote>,
    pub failed: Vec<TaskItem>,
}

impl FromIterator<QuoteResult> for FetchOutcome {
    fn from_iter<I: IntoIterator<Item = QuoteResult>>(iter: I) -> Self {
        let mut out = FetchOutcome::default();
        for r in iter {
            match r {
                QuoteResult::Parsed(q) => out.quotes.push(q),
                QuoteResult::Failed { item, kind } => {
                    tracing::debug!(symbol = %item.symbol.code, reason = %kind, "symbol failed to parse");
                    out.failed.push(item);
                }
            }
        }
        out
    }
}
