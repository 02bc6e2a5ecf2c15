use thiserror::Error;

/// Failure of a whole adapter call. Per-symbol parse failures are not
/// errors at this level; they come back inside `FetchOutcome::failed`.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("upstream payload rejected: {0}")]
    InvalidResponse(String),
}

/// Why a single symbol could not be turned into a canonical quote.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    #[error("payload too short ({0} fields)")]
    Truncated(usize),

    #[error("field `{field}` is not numeric: {value}")]
    NotNumeric { field: &'static str, value: String },

    #[error("invalid trade date: {0}")]
    BadDate(String),
}

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("write queue closed")]
    QueueClosed,

    #[error("write failed: {0}")]
    Failed(#[source] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("transport failure: {0}")]
    Transport(#[from] AdapterError),

    #[error("symbol {symbol} exhausted {attempts} attempts")]
    RetryExhausted { symbol: String, attempts: u32 },

    #[error(transparent)]
    Write(#[from] WriteError),
}
