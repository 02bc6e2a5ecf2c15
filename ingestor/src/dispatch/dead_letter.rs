use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::error::IngestError;
use crate::time::now_ms;

const DEFAULT_CAPACITY: usize = 1_024;

/// A symbol whose update was abandoned for the current cycle.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeadLetter {
    pub symbol: String,
    pub attempts: u32,
    pub reason: String,
    pub at_ms: u64,
}

/// Bounded in-memory record of dropped symbols, newest last.
/// Each entry is also emitted under the `dead_letter` tracing target.
#[derive(Clone)]
pub struct DeadLetterLog {
    inner: Arc<Mutex<VecDeque<DeadLetter>>>,
    capacity: usize,
}

impl DeadLetterLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(64)))),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, symbol: &str, attempts: u32) {
        let err = IngestError::RetryExhausted {
            symbol: symbol.to_string(),
            attempts,
        };

        warn!(
            target: "dead_letter",
            symbol,
            attempts,
            error = %err,
            "symbol dropped for this cycle"
        );

        let letter = DeadLetter {
            symbol: symbol.to_string(),
            attempts,
            reason: err.to_string(),
            at_ms: now_ms(),
        };

        let mut q = self.inner.lock();
        if q.len() == self.capacity {
            q.pop_front();
        }
        q.push_back(letter);
    }

    pub fn snapshot(&self) -> Vec<DeadLetter> {
        self.inner.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for DeadLetterLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn records_and_logs_dropped_symbols() {
        let log = DeadLetterLog::new(8);
        log.record("600519", 5);

        let all = log.snapshot();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].symbol, "600519");
        assert_eq!(all[0].attempts, 5);
        assert!(all[0].reason.contains("exhausted 5 attempts"));
        assert!(logs_contain("symbol dropped for this cycle"));
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let log = DeadLetterLog::new(2);
        log.record("a", 5);
        log.record("b", 5);
        log.record("c", 5);

        let codes: Vec<String> = log.snapshot().into_iter().map(|d| d.symbol).collect();
        assert_eq!(codes, vec!["b", "c"]);
    }
}
