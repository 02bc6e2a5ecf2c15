use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Minimal counters for operational visibility.
#[derive(Clone, Default)]
pub struct Counters {
    pub cycles_run: Arc<AtomicU64>,
    pub cycles_gated: Arc<AtomicU64>,
    pub batches_enqueued: Arc<AtomicU64>,

    // worker outcomes
    pub quotes_written: Arc<AtomicU64>,
    pub write_failures: Arc<AtomicU64>,
    pub transport_failures: Arc<AtomicU64>,

    // retry path
    pub symbols_requeued: Arc<AtomicU64>,
    pub symbols_dropped: Arc<AtomicU64>,
}

impl Counters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
