use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::adapter::{QuoteAdapter, ReferenceProbe, ReferenceReading};
use crate::error::{AdapterError, ParseErrorKind};
use crate::model::{CanonicalQuote, FetchOutcome, QuoteResult, SymbolRef, TaskItem};

// Positions in the `~`-separated record.
const F_CLOSE: usize = 3;
const F_PRIOR_CLOSE: usize = 4;
const F_OPEN: usize = 5;
const F_VOLUME: usize = 6;
const F_TIMESTAMP: usize = 30;
const F_HIGH: usize = 33;
const F_LOW: usize = 34;
const F_TURNOVER: usize = 38;

const MIN_FIELDS: usize = F_LOW + 1;

/// Volumes below this mean the instrument has not traded today.
const MIN_TRADED_VOLUME: i64 = 2;

const BELLWETHERS: [(&str, &str); 2] = [("600519", "Kweichow Moutai"), ("000001", "Ping An Bank")];

/// Text quote endpoint (`/q=sh600519,sz000001`).
#[derive(Clone)]
pub struct TencentAdapter {
    http: Client,
    url: String,
}

impl TencentAdapter {
    pub fn new(url: String) -> Result<Self, AdapterError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            url: url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_text(&self, items: &[TaskItem]) -> Result<String, AdapterError> {
        let codes: Vec<String> = items.iter().map(|i| i.symbol.vendor_code()).collect();
        let url = format!("{}/q={}", self.url, codes.join(","));

        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AdapterError::Status(status.as_u16()));
        }

        // Body is GBK; only ASCII fields are read so a lossy decode is enough.
        let bytes = resp.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[async_trait]
impl QuoteAdapter for TencentAdapter {
    fn name(&self) -> &str {
        "tencent"
    }

    #[instrument(skip(self, items), fields(size = items.len()), level = "debug")]
    async fn fetch(&self, items: &[TaskItem]) -> Result<FetchOutcome, AdapterError> {
        let text = self.fetch_text(items).await?;
        let outcome = parse_payload(items, &text);

        debug!(
            parsed = outcome.quotes.len(),
            failed = outcome.failed.len(),
            "tencent batch fetched"
        );

        Ok(outcome)
    }
}

#[async_trait]
impl ReferenceProbe for TencentAdapter {
    async fn probe(&self) -> Result<ReferenceReading, AdapterError> {
        let items: Vec<TaskItem> = BELLWETHERS
            .iter()
            .map(|(code, name)| TaskItem::fresh(SymbolRef::new(*code, *name)))
            .collect();

        let text = self.fetch_text(&items).await?;
        reference_reading(&items, &text)
    }
}

/// Splits a response body into per-symbol results.
///
/// Records are matched back to `items` by the vendor code in their
/// `v_<code>=` prefix; records for codes that were not requested, and
/// requested codes with no record, are ignored.
pub fn parse_payload(items: &[TaskItem], text: &str) -> FetchOutcome {
    let by_code: HashMap<String, &TaskItem> = items
        .iter()
        .map(|i| (i.symbol.vendor_code(), i))
        .collect();

    records(text)
        .filter_map(|(code, body)| {
            let item = by_code.get(code)?;
            match parse_record(&item.symbol, body) {
                Ok(Some(q)) => Some(QuoteResult::Parsed(q)),
                Ok(None) => None,
                Err(kind) => Some(QuoteResult::Failed {
                    item: (*item).clone(),
                    kind,
                }),
            }
        })
        .collect()
}

fn reference_reading(items: &[TaskItem], text: &str) -> Result<ReferenceReading, AdapterError> {
    let wanted: HashSet<String> = items.iter().map(|i| i.symbol.vendor_code()).collect();

    let mut best: Option<ReferenceReading> = None;
    for (code, body) in records(text) {
        if !wanted.contains(code) {
            continue;
        }
        // Untraded bellwethers still report their last session date.
        let Ok(reading) = parse_reading(body) else {
            continue;
        };
        best = match best {
            Some(b) if (b.day, b.volume) >= (reading.day, reading.volume) => Some(b),
            _ => Some(reading),
        };
    }

    best.ok_or_else(|| AdapterError::InvalidResponse("no bellwether record in payload".into()))
}

/// `(vendor_code, body)` for each `v_<code>="...";` record.
fn records(text: &str) -> impl Iterator<Item = (&str, &str)> {
    text.split(';').filter_map(|seg| {
        let (lhs, rhs) = seg.trim().split_once('=')?;
        let code = lhs.trim().trim_start_matches("v_");
        let body = rhs.trim().trim_matches('"');
        Some((code, body))
    })
}

fn parse_record(symbol: &SymbolRef, body: &str) -> Result<Option<CanonicalQuote>, ParseErrorKind> {
    let f: Vec<&str> = body.split('~').collect();
    if f.len() < MIN_FIELDS {
        return Err(ParseErrorKind::Truncated(f.len()));
    }

    let volume = int_field(&f, F_VOLUME, "volume")?;
    if volume < MIN_TRADED_VOLUME {
        return Ok(None);
    }

    let observed_at = timestamp(&f)?;

    Ok(Some(CanonicalQuote {
        symbol: symbol.code.clone(),
        name: symbol.name.clone(),
        day: observed_at.date(),
        observed_at,
        open: num_field(&f, F_OPEN, "open")?,
        high: num_field(&f, F_HIGH, "high")?,
        low: num_field(&f, F_LOW, "low")?,
        close: num_field(&f, F_CLOSE, "close")?,
        prior_close: num_field(&f, F_PRIOR_CLOSE, "prior_close")?,
        volume,
        turnover_rate: f.get(F_TURNOVER).and_then(|v| v.trim().parse::<f64>().ok()),
    }))
}

fn parse_reading(body: &str) -> Result<ReferenceReading, ParseErrorKind> {
    let f: Vec<&str> = body.split('~').collect();
    if f.len() <= F_TIMESTAMP {
        return Err(ParseErrorKind::Truncated(f.len()));
    }

    Ok(ReferenceReading {
        day: timestamp(&f)?.date(),
        volume: int_field(&f, F_VOLUME, "volume")?,
    })
}

fn timestamp(f: &[&str]) -> Result<NaiveDateTime, ParseErrorKind> {
    let raw = f[F_TIMESTAMP].trim();
    NaiveDateTime::parse_from_str(raw, "%Y%m%d%H%M%S")
        .map_err(|_| ParseErrorKind::BadDate(raw.to_string()))
}

fn num_field(f: &[&str], idx: usize, field: &'static str) -> Result<f64, ParseErrorKind> {
    let raw = f[idx].trim();
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseErrorKind::NotNumeric {
            field,
            value: raw.to_string(),
        })
}

fn int_field(f: &[&str], idx: usize, field: &'static str) -> Result<i64, ParseErrorKind> {
    let raw = f[idx].trim();
    raw.parse::<i64>().map_err(|_| ParseErrorKind::NotNumeric {
        field,
        value: raw.to_string(),
    })
}
