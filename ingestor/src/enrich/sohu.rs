use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::enrich::{HistoryBar, HistorySource};
use crate::model::SymbolRef;

const DAY_FORMAT: &str = "%Y-%m-%d";

// Positions in one `hq` row.
const H_DAY: usize = 0;
const H_OPEN: usize = 1;
const H_CLOSE: usize = 2;
const H_LOW: usize = 5;
const H_HIGH: usize = 6;
const H_VOLUME: usize = 7;
const H_TURNOVER: usize = 9;

/// `[{"code": "cn_600519", "hq": [["2024-03-04", open, close, ...], ...]}]`.
/// Unknown codes come back as an object instead of a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HistoryPayload {
    Series(Vec<RawSeries>),
    Other(serde::de::IgnoredAny),
}

#[derive(Debug, Deserialize)]
struct RawSeries {
    #[serde(default)]
    code: String,
    #[serde(default)]
    hq: Vec<Vec<String>>,
}

/// Daily history endpoint (`/hisHq?code=cn_600519&start=...&end=...`).
pub struct SohuHistory {
    http: Client,
    url: String,
}

impl SohuHistory {
    pub fn new(url: String) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .context("build history http client")?;

        Ok(Self {
            http,
            url: url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl HistorySource for SohuHistory {
    #[instrument(skip(self, symbol), fields(symbol = %symbol.code), level = "debug")]
    async fn daily_history(
        &self,
        symbol: &SymbolRef,
        since: NaiveDate,
        until: NaiveDate,
    ) -> anyhow::Result<Vec<HistoryBar>> {
        let url = format!(
            "{}/hisHq?code=cn_{}&start={}&end={}",
            self.url,
            symbol.code,
            since.format("%Y%m%d"),
            until.format("%Y%m%d")
        );

        let bytes = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        // Body is GBK; only ASCII fields are read.
        let text = String::from_utf8_lossy(&bytes);
        let bars = parse_history(&symbol.code, &text)?;

        debug!(bars = bars.len(), "history fetched");
        Ok(bars)
    }
}

/// Bars for `code`, oldest first. Malformed rows are skipped.
pub fn parse_history(code: &str, text: &str) -> anyhow::Result<Vec<HistoryBar>> {
    let payload: HistoryPayload =
        serde_json::from_str(text).context("decode history payload")?;

    let HistoryPayload::Series(series) = payload else {
        return Ok(Vec::new());
    };

    let wanted = format!("cn_{code}");
    let mut bars: Vec<HistoryBar> = series
        .into_iter()
        .filter(|s| s.code == wanted)
        .flat_map(|s| s.hq)
        .filter_map(|row| {
            let bar = parse_row(&row);
            if bar.is_none() {
                debug!(code, ?row, "skipping malformed history row");
            }
            bar
        })
        .collect();

    bars.sort_by_key(|b| b.day);
    Ok(bars)
}

fn parse_row(row: &[String]) -> Option<HistoryBar> {
    if row.len() <= H_VOLUME {
        return None;
    }

    let num = |idx: usize| row[idx].trim().parse::<f64>().ok().filter(|v| v.is_finite());

    Some(HistoryBar {
        day: NaiveDate::parse_from_str(row[H_DAY].trim(), DAY_FORMAT).ok()?,
        open: num(H_OPEN)?,
        high: num(H_HIGH)?,
        low: num(H_LOW)?,
        close: num(H_CLOSE)?,
        volume: num(H_VOLUME)? as i64,
        turnover_rate: row
            .get(H_TURNOVER)
            .and_then(|v| v.trim().trim_end_matches('%').parse::<f64>().ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"[{"status":0,"hq":[
        ["2024-03-05","10.10","10.30","0.20","1.98%","10.00","10.40","150000","15300.00","1.30%"],
        ["2024-03-04","9.90","10.10","0.20","2.02%","9.80","10.20","120000","12100.00","-"],
        ["2024-03-01","bad","10.00","0.00","0.00%","9.90","10.10","100","1000.00","0.10%"]
    ],"code":"cn_600519","stat":["sum","2024-03-01 to 2024-03-05"]}]"#;

    #[test]
    fn parses_rows_oldest_first() {
        let bars = parse_history("600519", PAYLOAD).unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].day, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(bars[0].open, 9.9);
        assert_eq!(bars[0].close, 10.1);
        assert_eq!(bars[0].low, 9.8);
        assert_eq!(bars[0].high, 10.2);
        assert_eq!(bars[0].volume, 120_000);
        assert_eq!(bars[0].turnover_rate, None);
        assert_eq!(bars[1].turnover_rate, Some(1.3));
    }

    #[test]
    fn other_codes_and_error_objects_yield_nothing() {
        assert!(parse_history("000001", PAYLOAD).unwrap().is_empty());
        assert!(
            parse_history("000001", r#"{"status":2,"msg":"no data"}"#)
                .unwrap()
                .is_empty()
        );
        assert!(parse_history("000001", "not json").is_err());
    }
}
