pub mod quote;
pub mod record;
pub mod symbol;
pub mod task;

pub use quote::{CanonicalQuote, FetchOutcome, QuoteResult};
pub use record::{DailyRecord, VolumeSample};
pub use symbol::{Region, Symbol, SymbolRef};
pub use task::{TaskBatch, TaskItem};
