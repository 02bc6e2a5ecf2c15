pub mod dead_letter;
pub mod dispatcher;
pub mod queue;
pub mod worker;

pub use dead_letter::{DeadLetter, DeadLetterLog};
pub use dispatcher::Dispatcher;
pub use queue::{Task, TaskQueue};
pub use worker::{WorkerConfig, WorkerPool};
