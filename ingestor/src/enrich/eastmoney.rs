use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::enrich::{FundFlowEntry, FundFlowSource};
use crate::indicators::ma::round2;
use crate::model::{Region, SymbolRef};

/// `{"data": {"klines": ["2024-03-04,-12345678.0,...", ...]}}`; `data` is
/// null for unknown codes.
#[derive(Debug, Deserialize)]
struct FlowPayload {
    data: Option<FlowData>,
}

#[derive(Debug, Deserialize)]
struct FlowData {
    #[serde(default)]
    klines: Vec<String>,
}

/// Daily fund-flow endpoint. The second kline field is the main-force net
/// inflow in CNY.
pub struct EastmoneyFundFlow {
    http: Client,
    url: String,
}

impl EastmoneyFundFlow {
    pub fn new(url: String) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .context("build fund-flow http client")?;

        Ok(Self {
            http,
            url: url.trim_end_matches('/').to_string(),
        })
    }
}

/// Market id used in `secid`. Only the two main exchanges are served.
fn market_id(code: &str) -> Option<u8> {
    match Region::from_code(code) {
        Region::Shanghai => Some(1),
        Region::Shenzhen => Some(0),
        Region::Beijing | Region::Unknown => None,
    }
}

#[async_trait]
impl FundFlowSource for EastmoneyFundFlow {
    #[instrument(skip(self, symbol), fields(symbol = %symbol.code), level = "debug")]
    async fn fund_flow(&self, symbol: &SymbolRef) -> anyhow::Result<Vec<FundFlowEntry>> {
        let Some(market) = market_id(&symbol.code) else {
            debug!("no fund-flow market for code");
            return Ok(Vec::new());
        };

        let url = format!(
            "{}/api/qt/stock/fflow/daykline/get?secid={}.{}&fields1=f1,f2,f3,f7&fields2=f51,f52,f62,f63&lmt=0",
            self.url, market, symbol.code
        );

        let payload: FlowPayload = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("decode fund-flow payload")?;

        let entries = entries_from(payload);
        debug!(entries = entries.len(), "fund flow fetched");
        Ok(entries)
    }
}

fn entries_from(payload: FlowPayload) -> Vec<FundFlowEntry> {
    payload
        .data
        .map(|d| d.klines)
        .unwrap_or_default()
        .iter()
        .filter_map(|line| parse_kline(line))
        .collect()
}

/// `day,net_inflow,...` with the inflow converted to 10k CNY.
fn parse_kline(line: &str) -> Option<FundFlowEntry> {
    let mut fields = line.split(',');
    let day = NaiveDate::parse_from_str(fields.next()?.trim(), "%Y-%m-%d").ok()?;
    let raw: f64 = fields.next()?.trim().parse().ok()?;
    if !raw.is_finite() {
        return None;
    }

    Some(FundFlowEntry {
        day,
        net_inflow: round2(raw / 10_000.0),
    })
}
