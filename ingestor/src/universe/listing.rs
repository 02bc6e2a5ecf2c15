use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::universe::{ListingEntry, ListingSource};

/// Row of the listing endpoint: `{"dm": "600519.SH", "mc": "..."}`.
#[derive(Debug, Deserialize)]
struct RawListing {
    dm: String,
    mc: String,
}

impl From<RawListing> for ListingEntry {
    fn from(r: RawListing) -> Self {
        let code = r.dm.split('.').next().unwrap_or(&r.dm).to_string();
        ListingEntry { code, name: r.mc }
    }
}

/// JSON listing endpoint returning every listed A-share.
pub struct HttpListingSource {
    http: Client,
    url: String,
}

impl HttpListingSource {
    pub fn new(url: String) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("build listing http client")?;

        Ok(Self { http, url })
    }
}

#[async_trait]
impl ListingSource for HttpListingSource {
    async fn fetch_listing(&self) -> anyhow::Result<Vec<ListingEntry>> {
        let raw: Vec<RawListing> = self
            .http
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("decode listing payload")?;

        debug!(entries = raw.len(), "listing fetched");
        Ok(raw.into_iter().map(ListingEntry::from).collect())
    }
}
