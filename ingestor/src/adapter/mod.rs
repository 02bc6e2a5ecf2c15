//! Upstream quote sources.
//!
//! Adapters hide vendor wire formats. A call either fails as a whole
//! (transport, status, unreadable body) or returns a [`FetchOutcome`] in
//! which every requested symbol is parsed, failed, or absent.

pub mod tencent;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::AdapterError;
use crate::model::{FetchOutcome, TaskItem};

pub use tencent::TencentAdapter;

#[async_trait]
pub trait QuoteAdapter: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn fetch(&self, items: &[TaskItem]) -> Result<FetchOutcome, AdapterError>;
}

/// Latest session seen on a bellwether instrument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReferenceReading {
    pub day: NaiveDate,
    pub volume: i64,
}

/// Used by the session gate to tell whether the exchange trades today.
#[async_trait]
pub trait ReferenceProbe: Send + Sync + 'static {
    async fn probe(&self) -> Result<ReferenceReading, AdapterError>;
}
