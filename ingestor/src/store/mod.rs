pub mod repository;
pub mod repository_sqlx;
pub mod writer;

pub use repository::QuoteRepository;
pub use repository_sqlx::SqlxQuoteRepository;
pub use writer::WriteQueue;
