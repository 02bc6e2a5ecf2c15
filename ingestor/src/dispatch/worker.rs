//! Worker pool consuming the task queue.
//!
//! Each worker is bound to one adapter (round-robin over the configured
//! vendors) and handles one batch at a time:
//! - the batch is split into sub-batches of at most `adapter_batch_limit`
//! - a transport failure re-queues the whole sub-batch and backs off
//! - symbols that fail to parse are re-queued with one more attempt, or
//!   dead-lettered once the attempt budget is spent
//! - parsed quotes go through the write queue (indicator row, then volume sample)
//!
//! A worker never fails as a whole; errors are logged, counted and contained
//! to the affected symbols.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

use crate::adapter::QuoteAdapter;
use crate::config::AppConfig;
use crate::dispatch::dead_letter::DeadLetterLog;
use crate::dispatch::queue::{Task, TaskQueue};
use crate::error::IngestError;
use crate::logger::batch_span;
use crate::metrics::counters::Counters;
use crate::model::{CanonicalQuote, TaskBatch, TaskItem};
use crate::store::WriteQueue;
use crate::store::writer::volume_sample_for;
use crate::time::ExchangeClock;

#[derive(Clone, Copy, Debug)]
pub struct WorkerConfig {
    pub adapter_batch_limit: usize,
    pub max_retries: u32,
    pub transport_backoff: Duration,
}

impl From<&AppConfig> for WorkerConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            adapter_batch_limit: cfg.adapter_batch_limit,
            max_retries: cfg.max_retries,
            transport_backoff: cfg.transport_backoff,
        }
    }
}

pub struct WorkerPool {
    queue: TaskQueue,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        worker_count: usize,
        queue: TaskQueue,
        adapters: Vec<Arc<dyn QuoteAdapter>>,
        writer: WriteQueue,
        clock: ExchangeClock,
        cfg: WorkerConfig,
        counters: Counters,
        dead_letters: DeadLetterLog,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(!adapters.is_empty(), "worker pool needs at least one adapter");

        let handles = (0..worker_count.max(1))
            .map(|id| {
                let worker = Worker {
                    id,
                    adapter: adapters[id % adapters.len()].clone(),
                    queue: queue.clone(),
                    writer: writer.clone(),
                    clock,
                    cfg,
                    counters: counters.clone(),
                    dead_letters: dead_letters.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        Ok(Self { queue, handles })
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Waits for the queue to drain, then sends one shutdown sentinel per
    /// worker and waits for every worker to exit.
    ///
    /// Draining first matters: a batch re-queued behind the sentinels would
    /// otherwise be left with no worker to pick it up.
    pub async fn shutdown(self) {
        self.queue.join().await;

        for _ in 0..self.handles.len() {
            self.queue.put(Task::Shutdown);
        }

        self.queue.join().await;

        for h in self.handles {
            if let Err(e) = h.await {
                warn!(component = "worker", error = %e, "worker task ended abnormally");
            }
        }

        info!(component = "worker", event = "shutdown", "Worker pool drained");
    }
}

struct Worker {
    id: usize,
    adapter: Arc<dyn QuoteAdapter>,
    queue: TaskQueue,
    writer: WriteQueue,
    clock: ExchangeClock,
    cfg: WorkerConfig,
    counters: Counters,
    dead_letters: DeadLetterLog,
}

impl Worker {
    async fn run(self) {
        info!(
            component = "worker",
            event = "startup",
            worker = self.id,
            adapter = self.adapter.name(),
            "Worker started"
        );

        while let Some(task) = self.queue.pop().await {
            match task {
                Task::Shutdown => {
                    self.queue.task_done();
                    break;
                }
                Task::Batch(batch) => {
                    let span = batch_span(self.id, self.adapter.name(), batch.len());
                    self.handle_batch(batch).instrument(span).await;
                    self.queue.task_done();
                }
            }
        }

        debug!(component = "worker", worker = self.id, "Worker exited");
    }

    async fn handle_batch(&self, batch: TaskBatch) {
        let limit = self.cfg.adapter_batch_limit.max(1);

        for chunk in batch.items.chunks(limit) {
            match self.adapter.fetch(chunk).await {
                Ok(outcome) => {
                    for quote in outcome.quotes {
                        self.persist(quote).await;
                    }
                    self.retry_or_drop(outcome.failed);
                }
                Err(e) => {
                    let err = IngestError::from(e);
                    Counters::incr(&self.counters.transport_failures);
                    warn!(
                        event = "transport_failure",
                        size = chunk.len(),
                        backoff_ms = self.cfg.transport_backoff.as_millis() as u64,
                        error = %err,
                        "adapter call failed; re-queueing sub-batch"
                    );

                    self.queue.put(Task::Batch(TaskBatch::new(chunk.to_vec())));
                    tokio::time::sleep(self.cfg.transport_backoff).await;
                }
            }
        }
    }

    async fn persist(&self, quote: CanonicalQuote) {
        let sample = volume_sample_for(&quote, &self.clock);
        let symbol = quote.symbol.clone();

        if let Err(e) = self.writer.upsert_quote(quote, &self.clock).await {
            Counters::incr(&self.counters.write_failures);
            warn!(symbol = %symbol, error = %IngestError::from(e), "daily record write failed");
            return;
        }

        if let Err(e) = self.writer.append_volume_sample(sample).await {
            Counters::incr(&self.counters.write_failures);
            warn!(symbol = %symbol, error = %IngestError::from(e), "volume sample write failed");
            return;
        }

        Counters::incr(&self.counters.quotes_written);
    }

    fn retry_or_drop(&self, failed: Vec<TaskItem>) {
        if failed.is_empty() {
            return;
        }

        let (retry, exhausted): (Vec<TaskItem>, Vec<TaskItem>) = failed
            .iter()
            .map(TaskItem::next_attempt)
            .partition(|item| item.attempt < self.cfg.max_retries);

        for item in &exhausted {
            Counters::incr(&self.counters.symbols_dropped);
            self.dead_letters.record(&item.symbol.code, item.attempt);
        }

        if !retry.is_empty() {
            Counters::add(&self.counters.symbols_requeued, retry.len() as u64);
            debug!(
                event = "requeue",
                count = retry.len(),
                "re-queueing symbols that failed to parse"
            );
            self.queue.put(Task::Batch(TaskBatch::new(retry)));
        }
    }
}
