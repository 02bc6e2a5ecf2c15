//! Batch dispatcher.
//!
//! Turns the active symbol universe into task batches. One cycle reads the
//! universe, shuffles it so no symbol is systematically last, slices it
//! into batches and pushes them with a pause between pushes.
//!
//! Cycles never overlap: a cycle that starts while another is still pushing
//! is skipped.
//!
//! [`Dispatcher::close`] stops production for good. A cycle in progress
//! stops before its next push, and later cycles are no-ops, so the worker
//! pool can drain without new batches arriving behind its shutdown sentinels.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::sync::Mutex;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{Instrument, Span, debug, error, info};

use crate::dispatch::queue::{Task, TaskQueue};
use crate::logger::{TraceId, cycle_span, warn_if_slow};
use crate::metrics::counters::Counters;
use crate::model::{Symbol, TaskBatch};
use crate::session::TradingWindow;
use crate::store::QuoteRepository;
use crate::time::Clock;

pub struct Dispatcher {
    repo: Arc<dyn QuoteRepository>,
    queue: TaskQueue,
    gate: Arc<dyn TradingWindow>,
    clock: Arc<dyn Clock>,

    /// Symbols per batch.
    batch_size: usize,

    /// Pause between two pushes of the same cycle.
    batch_interval: Duration,

    counters: Counters,
    running: Mutex<()>,
    closed: AtomicBool,
}

impl Dispatcher {
    pub fn new(
        repo: Arc<dyn QuoteRepository>,
        queue: TaskQueue,
        gate: Arc<dyn TradingWindow>,
        clock: Arc<dyn Clock>,
        batch_size: usize,
        batch_interval: Duration,
        counters: Counters,
    ) -> Self {
        Self {
            repo,
            queue,
            gate,
            clock,
            batch_size: batch_size.max(1),
            batch_interval,
            counters,
            running: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Pushes the whole active universe onto the queue.
    /// Returns the number of batches pushed, which is short of the full
    /// universe when the dispatcher is closed mid-cycle.
    pub async fn schedule_universe(&self) -> anyhow::Result<usize> {
        let mut symbols: Vec<Symbol> = warn_if_slow(
            "active_symbols",
            Duration::from_millis(500),
            self.repo.active_symbols(),
        )
        .await?;

        symbols.shuffle(&mut rand::thread_rng());

        let batches: Vec<TaskBatch> = symbols
            .chunks(self.batch_size)
            .map(|chunk| TaskBatch::fresh(chunk.iter().map(Symbol::to_ref)))
            .collect();

        let planned = batches.len();
        let mut pushed = 0usize;

        for (i, batch) in batches.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.batch_interval).await;
            }
            if self.is_closed() {
                info!(pushed, planned, "dispatcher closed; abandoning cycle");
                break;
            }
            self.queue.put(Task::Batch(batch));
            Counters::incr(&self.counters.batches_enqueued);
            pushed += 1;
        }

        Span::current().record("batches", pushed);
        info!(symbols = symbols.len(), batches = pushed, "universe scheduled");
        Ok(pushed)
    }

    /// One gated cycle. Returns whether anything was scheduled.
    pub async fn run_cycle(&self) -> anyhow::Result<bool> {
        if !self.gate.is_trading_window_open() {
            Counters::incr(&self.counters.cycles_gated);
            debug!("trading window closed; skipping cycle");
            return Ok(false);
        }

        self.exclusive("cycle").await
    }

    /// Post-close sweep capturing final daily values, only on days the
    /// market actually traded.
    pub async fn settle(&self) -> anyhow::Result<bool> {
        let today = self.clock.now().date();
        if !self.gate.traded_on(today) {
            debug!(%today, "market did not trade today; skipping settle");
            return Ok(false);
        }

        self.exclusive("settle").await
    }

    async fn exclusive(&self, name: &'static str) -> anyhow::Result<bool> {
        let Ok(_guard) = self.running.try_lock() else {
            debug!(name, "previous cycle still running; skipping");
            return Ok(false);
        };
        if self.is_closed() {
            debug!(name, "dispatcher closed; skipping");
            return Ok(false);
        }

        let span = cycle_span(name, &TraceId::default());
        self.schedule_universe().instrument(span).await?;
        Counters::incr(&self.counters.cycles_run);

        Ok(true)
    }

    /// Stops all further pushes and waits for a cycle in progress to return.
    ///
    /// Once this resolves nothing this dispatcher owns will touch the queue
    /// again, including cycles spawned from the session clock.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _guard = self.running.lock().await;
        info!(component = "dispatcher", event = "closed", "Dispatcher closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Fixed-cadence loop; the first cycle runs immediately.
    pub async fn run(self: Arc<Self>, every: Duration) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            component = "dispatcher",
            event = "startup",
            every_s = every.as_secs(),
            "Dispatcher started"
        );

        loop {
            ticker.tick().await;

            if let Err(e) = self.run_cycle().await {
                error!(error = ?e, "dispatch cycle failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DailyRecord, VolumeSample};
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct UniverseRepo {
        symbols: Vec<Symbol>,
        fail: AtomicBool,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl QuoteRepository for UniverseRepo {
        async fn active_symbols(&self) -> Result<Vec<Symbol>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("db unavailable");
            }
            Ok(self.symbols.iter().filter(|s| s.active).cloned().collect())
        }
        async fn get_symbol(&self, _: &str) -> Result<Option<Symbol>> {
            Ok(None)
        }
        async fn upsert_symbol(&self, _: &Symbol) -> Result<()> {
            Ok(())
        }
        async fn set_symbol_active(&self, _: &str, _: bool) -> Result<()> {
            Ok(())
        }
        async fn recent_records(&self, _: &str, _: usize, _: NaiveDate) -> Result<Vec<DailyRecord>> {
            Ok(vec![])
        }
        async fn get_record(&self, _: &str, _: NaiveDate) -> Result<Option<DailyRecord>> {
            Ok(None)
        }
        async fn upsert_daily(&self, _: &DailyRecord) -> Result<()> {
            Ok(())
        }
        async fn fill_turnover_rate(&self, _: &str, _: NaiveDate, _: f64) -> Result<bool> {
            Ok(false)
        }
        async fn fill_net_inflow(&self, _: &str, _: NaiveDate, _: f64) -> Result<bool> {
            Ok(false)
        }
        async fn append_volume_sample(&self, _: &VolumeSample) -> Result<()> {
            Ok(())
        }
        async fn recent_volume_samples(&self, _: &str, _: &str, _: usize, _: i64) -> Result<Vec<i64>> {
            Ok(vec![])
        }
    }

    struct FixedWindow {
        open: AtomicBool,
        traded: bool,
    }

    impl TradingWindow for FixedWindow {
        fn is_trading_window_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }
        fn traded_on(&self, _: NaiveDate) -> bool {
            self.traded
        }
    }

    struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> NaiveDateTime {
            NaiveDate::from_ymd_opt(2024, 3, 4)
                .unwrap()
                .and_hms_opt(18, 0, 0)
                .unwrap()
        }
    }

    fn universe(n: usize) -> Vec<Symbol> {
        (0..n)
            .map(|i| Symbol::new(format!("600{i:03}"), format!("S{i}"), i % 10 != 9))
            .collect()
    }

    fn dispatcher(
        repo: Arc<UniverseRepo>,
        window: Arc<FixedWindow>,
        queue: TaskQueue,
        counters: Counters,
    ) -> Dispatcher {
        Dispatcher::new(
            repo,
            queue,
            window,
            Arc::new(FixedClock),
            4,
            Duration::from_millis(100),
            counters,
        )
    }

    async fn drain(queue: &TaskQueue) -> Vec<TaskBatch> {
        let mut out = Vec::new();
        for _ in 0..queue.pending() {
            if let Some(Task::Batch(b)) = queue.pop().await {
                out.push(b);
            }
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn schedules_every_active_symbol_once() {
        let repo = Arc::new(UniverseRepo {
            symbols: universe(20),
            fail: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
        });
        let window = Arc::new(FixedWindow {
            open: AtomicBool::new(true),
            traded: true,
        });
        let queue = TaskQueue::new();
        let counters = Counters::default();
        let d = dispatcher(repo, window, queue.clone(), counters.clone());

        assert!(d.run_cycle().await.unwrap());

        let batches = drain(&queue).await;
        // 18 active symbols in batches of 4
        assert_eq!(batches.len(), 5);
        assert!(batches.iter().all(|b| b.len() <= 4));

        let codes: HashSet<String> = batches
            .iter()
            .flat_map(|b| b.items.iter().map(|i| i.symbol.code.clone()))
            .collect();
        assert_eq!(codes.len(), 18);
        assert!(batches.iter().flat_map(|b| &b.items).all(|i| i.attempt == 0));
        assert_eq!(Counters::get(&counters.batches_enqueued), 5);
        assert_eq!(Counters::get(&counters.cycles_run), 1);
    }

    #[tokio::test]
    async fn closed_window_schedules_nothing() {
        let repo = Arc::new(UniverseRepo {
            symbols: universe(5),
            fail: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
        });
        let window = Arc::new(FixedWindow {
            open: AtomicBool::new(false),
            traded: false,
        });
        let queue = TaskQueue::new();
        let counters = Counters::default();
        let d = dispatcher(repo.clone(), window, queue.clone(), counters.clone());

        assert!(!d.run_cycle().await.unwrap());
        assert!(!d.settle().await.unwrap());
        assert_eq!(queue.pending(), 0);
        assert_eq!(repo.reads.load(Ordering::SeqCst), 0);
        assert_eq!(Counters::get(&counters.cycles_gated), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn settle_runs_after_close_on_trading_days() {
        let repo = Arc::new(UniverseRepo {
            symbols: universe(3),
            fail: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
        });
        let window = Arc::new(FixedWindow {
            open: AtomicBool::new(false),
            traded: true,
        });
        let queue = TaskQueue::new();
        let d = dispatcher(repo, window, queue.clone(), Counters::default());

        assert!(d.settle().await.unwrap());
        assert_eq!(queue.pending(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn close_stops_a_cycle_mid_push_and_later_cycles() {
        let repo = Arc::new(UniverseRepo {
            symbols: universe(40),
            fail: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
        });
        let window = Arc::new(FixedWindow {
            open: AtomicBool::new(true),
            traded: true,
        });
        let queue = TaskQueue::new();
        let d = Arc::new(dispatcher(repo, window, queue.clone(), Counters::default()));

        // 36 active symbols, 9 batches, 100ms apart
        let cycle = tokio::spawn({
            let d = d.clone();
            async move { d.run_cycle().await }
        });
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(queue.pending(), 2);

        d.close().await;
        assert!(cycle.await.unwrap().unwrap());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(queue.pending(), 2);

        assert!(!d.run_cycle().await.unwrap());
        assert!(!d.settle().await.unwrap());
        assert_eq!(queue.pending(), 2);
    }

    #[tokio::test]
    async fn read_failure_aborts_cycle_without_pushing() {
        let repo = Arc::new(UniverseRepo {
            symbols: universe(8),
            fail: AtomicBool::new(true),
            reads: AtomicUsize::new(0),
        });
        let window = Arc::new(FixedWindow {
            open: AtomicBool::new(true),
            traded: true,
        });
        let queue = TaskQueue::new();
        let d = dispatcher(repo.clone(), window, queue.clone(), Counters::default());

        assert!(d.run_cycle().await.is_err());
        assert_eq!(queue.pending(), 0);

        // the next cycle is unaffected
        repo.fail.store(false, Ordering::SeqCst);
        assert!(d.run_cycle().await.unwrap());
        assert!(queue.pending() > 0);
    }
}
