//! Single-writer persistence queue.
//!
//! Every mutation of the store goes through one background task that runs
//! jobs strictly in submission order, one at a time. Callers hold a cheap
//! cloneable [`WriteQueue`] handle and await a per-job result channel.
//!
//! Guarantees:
//! - at most one job is executing at any moment, process-wide
//! - jobs complete in FIFO order
//! - a failed job never stops the writer; the error goes back to its caller
//!
//! The indicator row and its volume sample are two separate jobs. A crash
//! between them leaves one without the other; both are rebuilt from the next
//! quote of the same symbol.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use crate::error::WriteError;
use crate::indicators::{self, EngineInput, HISTORY_DEPTH, compute_next};
use crate::logger::warn_if_slow;
use crate::model::{CanonicalQuote, DailyRecord, VolumeSample};
use crate::store::repository::QuoteRepository;
use crate::time::{ExchangeClock, elapsed_trading_minutes, volume_bucket};

type Job = Box<dyn FnOnce(Arc<dyn QuoteRepository>) -> BoxFuture<'static, ()> + Send>;

const SLOW_READ: Duration = Duration::from_millis(250);

#[derive(Clone)]
pub struct WriteQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl WriteQueue {
    /// Starts the writer task. It exits once every handle has been dropped
    /// and the backlog is drained.
    pub fn spawn(repo: Arc<dyn QuoteRepository>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        let handle = tokio::spawn(async move {
            info!(component = "writer", event = "startup", "Write queue started");

            let mut executed: u64 = 0;
            while let Some(job) = rx.recv().await {
                job(repo.clone()).await;
                executed += 1;
            }

            info!(
                component = "writer",
                event = "shutdown",
                executed,
                "Write queue drained"
            );
        });

        (Self { tx }, handle)
    }

    /// Enqueues `f` and waits for it to run on the writer task.
    pub async fn submit<F, Fut, T>(&self, f: F) -> Result<T, WriteError>
    where
        F: FnOnce(Arc<dyn QuoteRepository>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();

        let job: Job = Box::new(move |repo: Arc<dyn QuoteRepository>| -> BoxFuture<'static, ()> {
            Box::pin(async move {
                let out = f(repo).await;
                // caller may have given up; nothing to do then
                let _ = done_tx.send(out);
            })
        });

        self.tx.send(job).map_err(|_| WriteError::QueueClosed)?;

        match done_rx.await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(WriteError::Failed(e)),
            Err(_) => Err(WriteError::QueueClosed),
        }
    }

    /// Read prior state, compute the next row and upsert it, as one job.
    #[instrument(
        skip_all,
        fields(symbol = %quote.symbol, day = %quote.day)
    )]
    pub async fn upsert_quote(
        &self,
        quote: CanonicalQuote,
        clock: &ExchangeClock,
    ) -> Result<DailyRecord, WriteError> {
        let bucket = volume_bucket(quote.observed_at.time());
        let elapsed_minutes = elapsed_trading_minutes(quote.observed_at.time());
        // Baseline only looks at earlier days so replays see the same samples.
        let day_start_ms = clock.to_epoch_ms(quote.day.and_time(chrono::NaiveTime::MIN));

        self.submit(move |repo| async move {
            let history = warn_if_slow(
                "recent_records",
                SLOW_READ,
                repo.recent_records(&quote.symbol, HISTORY_DEPTH, quote.day),
            )
            .await?;

            let baseline = warn_if_slow(
                "recent_volume_samples",
                SLOW_READ,
                repo.recent_volume_samples(
                    &quote.symbol,
                    &bucket,
                    indicators::volume::MAX_SAMPLES,
                    day_start_ms,
                ),
            )
            .await?;

            let record = compute_next(&EngineInput {
                quote: &quote,
                history: &history,
                baseline_volumes: &baseline,
                elapsed_minutes,
            });

            repo.upsert_daily(&record).await?;
            debug!(
                history = history.len(),
                baseline = baseline.len(),
                "daily record upserted"
            );

            Ok::<_, anyhow::Error>(record)
        })
        .await
    }

    pub async fn append_volume_sample(&self, sample: VolumeSample) -> Result<(), WriteError> {
        self.submit(move |repo| async move { repo.append_volume_sample(&sample).await })
            .await
    }
}

/// Volume sample for `quote`, bucketed by its exchange-local timestamp.
pub fn volume_sample_for(quote: &CanonicalQuote, clock: &ExchangeClock) -> VolumeSample {
    VolumeSample {
        symbol: quote.symbol.clone(),
        bucket: volume_bucket(quote.observed_at.time()),
        volume: quote.volume,
        price: quote.close,
        observed_ms: clock.to_epoch_ms(quote.observed_at),
    }
}
