use std::sync::Arc;
use std::time::Duration;

use ingestor::{
    adapter::{QuoteAdapter, TencentAdapter},
    config::AppConfig,
    db::Db,
    dispatch::{DeadLetterLog, Dispatcher, TaskQueue, WorkerConfig, WorkerPool},
    enrich::{EastmoneyFundFlow, EnrichConfig, Enricher, SohuHistory},
    logger::init_tracing,
    metrics::counters::Counters,
    session::{GateConfig, SessionGate, run_session_clock},
    store::{QuoteRepository, WriteQueue},
    time::{Clock, ExchangeClock},
    universe::{HttpListingSource, sweep_listing},
};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

/// Connects, runs migrations and returns the repository used by every component.
async fn init_store(cfg: &AppConfig) -> anyhow::Result<Arc<dyn QuoteRepository>> {
    let db = Db::connect(&cfg.database_url).await?;
    db.migrate().await?;

    Ok(db.quote_repository())
}

/// Periodic listing sweep keeping the symbol table current. The first sweep
/// runs immediately so a fresh database gets a universe.
fn start_listing_sweep(
    url: String,
    writer: WriteQueue,
    every: Duration,
) -> anyhow::Result<JoinHandle<()>> {
    let source = HttpListingSource::new(url)?;

    Ok(tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            if let Err(e) = sweep_listing(&source, &writer).await {
                tracing::error!(error = ?e, "listing sweep failed");
            }
        }
    }))
}

/// Daily enrichment pass: history backfill for new symbols, turnover and
/// net inflow for closed days.
fn start_enrichment(
    cfg: &AppConfig,
    writer: WriteQueue,
    clock: ExchangeClock,
) -> anyhow::Result<JoinHandle<()>> {
    let enricher = Arc::new(Enricher::new(
        Arc::new(SohuHistory::new(cfg.history_endpoint.clone())?),
        Arc::new(EastmoneyFundFlow::new(cfg.fund_flow_endpoint.clone())?),
        writer,
        clock,
        EnrichConfig::from(cfg),
    ));

    Ok(tokio::spawn(enricher.run(cfg.enrich_interval)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);

    tracing::info!("Starting quote ingestor...");

    let cfg = AppConfig::from_env();
    let counters = Counters::default();
    let exchange_clock = ExchangeClock::new(cfg.exchange_tz);
    let clock: Arc<dyn Clock> = Arc::new(exchange_clock);

    let repo = init_store(&cfg).await?;
    let (writer, writer_task) = WriteQueue::spawn(repo.clone());

    let tencent = Arc::new(TencentAdapter::new(cfg.quote_endpoint.clone())?);
    let adapters: Vec<Arc<dyn QuoteAdapter>> = vec![tencent.clone()];

    let queue = TaskQueue::new();
    let dead_letters = DeadLetterLog::default();

    let pool = WorkerPool::spawn(
        cfg.worker_count,
        queue.clone(),
        adapters,
        writer.clone(),
        exchange_clock,
        WorkerConfig::from(&cfg),
        counters.clone(),
        dead_letters.clone(),
    )?;
    tracing::info!(workers = pool.size(), "worker pool started");

    let gate = Arc::new(SessionGate::new(GateConfig::default()));

    let dispatcher = Arc::new(Dispatcher::new(
        repo,
        queue,
        gate.clone(),
        clock.clone(),
        cfg.batch_size,
        cfg.batch_interval,
        counters.clone(),
    ));

    let mut background = vec![
        tokio::spawn(dispatcher.clone().run(cfg.cycle_interval)),
        tokio::spawn(run_session_clock(gate, tencent, clock, dispatcher.clone())),
    ];

    if let Some(url) = cfg.listing_endpoint.clone() {
        background.push(start_listing_sweep(
            url,
            writer.clone(),
            cfg.listing_interval,
        )?);
    }

    if cfg.enrich_enabled {
        background.push(start_enrichment(&cfg, writer.clone(), exchange_clock)?);
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    // Stop producing work, then let the workers drain what is queued.
    for task in &background {
        task.abort();
    }
    for task in background {
        let _ = task.await;
    }
    // Cycles kicked by the session clock run detached; close waits them out.
    dispatcher.close().await;

    pool.shutdown().await;

    drop(writer);
    if let Err(e) = writer_task.await {
        tracing::warn!(error = %e, "write queue ended abnormally");
    }

    tracing::info!(
        cycles_run = Counters::get(&counters.cycles_run),
        cycles_gated = Counters::get(&counters.cycles_gated),
        quotes_written = Counters::get(&counters.quotes_written),
        write_failures = Counters::get(&counters.write_failures),
        transport_failures = Counters::get(&counters.transport_failures),
        symbols_requeued = Counters::get(&counters.symbols_requeued),
        symbols_dropped = Counters::get(&counters.symbols_dropped),
        dead_letters = dead_letters.len(),
        "Shutdown complete"
    );

    Ok(())
}
