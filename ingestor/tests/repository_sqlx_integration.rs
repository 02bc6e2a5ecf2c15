use chrono::NaiveDate;
use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use uuid::Uuid;

use ingestor::db::schema;
use ingestor::model::{DailyRecord, Symbol, VolumeSample};
use ingestor::store::{QuoteRepository, SqlxQuoteRepository};

/// Isolated in-memory DB per test.
/// Unique name prevents test interference during parallel execution.
/// `cache=shared` lets every connection of the pool see the same database.
async fn setup_db() -> AnyPool {
    sqlx::any::install_default_drivers();

    let db_name = Uuid::new_v4().to_string();
    let conn = format!("sqlite:file:{}?mode=memory&cache=shared", db_name);

    let pool = AnyPoolOptions::new()
        .max_connections(5)
        .connect(&conn)
        .await
        .expect("connect sqlite memory db");

    schema::migrate(&pool).await.expect("migrate");
    pool
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

fn record(symbol: &str, d: u32, close: f64) -> DailyRecord {
    DailyRecord {
        symbol: symbol.to_string(),
        day: day(d),
        name: format!("name-{symbol}"),
        open: close,
        high: close + 0.5,
        low: close - 0.5,
        close,
        prior_close: close,
        volume: 1_000,
        turnover_rate: Some(0.8),
        ma5: close,
        ma10: close,
        ma20: close,
        ema_short: close,
        ema_long: close,
        diff: 0.0,
        signal_line: 0.0,
        kdj_k: 50.0,
        kdj_d: 50.0,
        kdj_j: 50.0,
        trix_ema1: close,
        trix_ema2: close,
        trix_ema3: close,
        trix: 0.0,
        trix_ma: 0.0,
        boll_upper: close,
        boll_lower: close,
        volume_ratio: 1.0,
        net_inflow: None,
    }
}

#[tokio::test]
async fn upsert_daily_creates_then_updates_in_place() {
    let pool = setup_db().await;
    let repo = SqlxQuoteRepository::new(pool.clone());

    repo.upsert_daily(&record("600519", 4, 10.0)).await.unwrap();

    let mut later = record("600519", 4, 11.0);
    later.kdj_k = 61.5;
    repo.upsert_daily(&later).await.unwrap();

    let stored = repo.get_record("600519", day(4)).await.unwrap().unwrap();
    assert_eq!(stored, later);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM daily_records")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn missing_optional_fields_keep_stored_values() {
    let pool = setup_db().await;
    let repo = SqlxQuoteRepository::new(pool.clone());

    let mut first = record("000001", 4, 10.0);
    first.net_inflow = Some(1_250.0);
    first.turnover_rate = Some(2.5);
    repo.upsert_daily(&first).await.unwrap();

    let mut second = record("000001", 4, 10.2);
    second.net_inflow = None;
    second.turnover_rate = None;
    repo.upsert_daily(&second).await.unwrap();

    let stored = repo.get_record("000001", day(4)).await.unwrap().unwrap();
    assert_eq!(stored.close, 10.2);
    assert_eq!(stored.net_inflow, Some(1_250.0));
    assert_eq!(stored.turnover_rate, Some(2.5));
}

#[tokio::test]
async fn recent_records_are_strictly_before_day_most_recent_first() {
    let pool = setup_db().await;
    let repo = SqlxQuoteRepository::new(pool);

    for d in 1..=8 {
        repo.upsert_daily(&record("600000", d, 10.0 + d as f64))
            .await
            .unwrap();
    }
    repo.upsert_daily(&record("600001", 7, 99.0)).await.unwrap();

    let recent = repo.recent_records("600000", 3, day(7)).await.unwrap();
    let days: Vec<NaiveDate> = recent.iter().map(|r| r.day).collect();
    assert_eq!(days, vec![day(6), day(5), day(4)]);
    assert!(recent.iter().all(|r| r.symbol == "600000"));

    assert!(repo.recent_records("600000", 5, day(1)).await.unwrap().is_empty());
}

#[tokio::test]
async fn volume_samples_filter_by_bucket_and_time() {
    let pool = setup_db().await;
    let repo = SqlxQuoteRepository::new(pool);

    let samples = [
        ("1000", 100, 1_000),
        ("1000", 200, 2_000),
        ("1010", 999, 2_500),
        ("1000", 300, 3_000),
        ("1000", 400, 9_000),
    ];
    for (bucket, volume, observed_ms) in samples {
        repo.append_volume_sample(&VolumeSample {
            symbol: "300750".into(),
            bucket: bucket.into(),
            volume,
            price: 180.0,
            observed_ms,
        })
        .await
        .unwrap();
    }

    let got = repo
        .recent_volume_samples("300750", "1000", 2, 5_000)
        .await
        .unwrap();
    assert_eq!(got, vec![300, 200]);
}

#[tokio::test]
async fn symbols_activation_round_trip() {
    let pool = setup_db().await;
    let repo = SqlxQuoteRepository::new(pool);

    repo.upsert_symbol(&Symbol::new("600519", "Kweichow Moutai", true))
        .await
        .unwrap();
    repo.upsert_symbol(&Symbol::new("000002", "*ST Vanke", false))
        .await
        .unwrap();

    let active = repo.active_symbols().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].code, "600519");
    assert_eq!(active[0].kind, "sh-main");

    // re-upsert never touches `active`
    repo.upsert_symbol(&Symbol::new("600519", "Moutai", false))
        .await
        .unwrap();
    let s = repo.get_symbol("600519").await.unwrap().unwrap();
    assert!(s.active);
    assert_eq!(s.name, "Moutai");

    repo.set_symbol_active("000002", true).await.unwrap();
    assert_eq!(repo.active_symbols().await.unwrap().len(), 2);

    assert!(repo.set_symbol_active("999999", true).await.is_err());
}

#[tokio::test]
async fn turnover_fill_only_touches_missing_or_zero_rates() {
    let pool = setup_db().await;
    let repo = SqlxQuoteRepository::new(pool);

    let mut missing = record("600519", 4, 10.0);
    missing.turnover_rate = None;
    let mut zero = record("600519", 5, 10.0);
    zero.turnover_rate = Some(0.0);
    let known = record("600519", 6, 10.0);
    for r in [&missing, &zero, &known] {
        repo.upsert_daily(r).await.unwrap();
    }

    assert!(repo.fill_turnover_rate("600519", day(4), 1.4).await.unwrap());
    assert!(repo.fill_turnover_rate("600519", day(5), 1.5).await.unwrap());
    assert!(!repo.fill_turnover_rate("600519", day(6), 9.9).await.unwrap());
    assert!(!repo.fill_turnover_rate("600519", day(7), 1.7).await.unwrap());

    let mut rates = Vec::new();
    for d in 4..=6 {
        let stored = repo.get_record("600519", day(d)).await.unwrap().unwrap();
        rates.push(stored.turnover_rate);
    }
    assert_eq!(rates, vec![Some(1.4), Some(1.5), Some(0.8)]);
    assert!(repo.get_record("600519", day(7)).await.unwrap().is_none());
}

#[tokio::test]
async fn net_inflow_fill_never_overwrites() {
    let pool = setup_db().await;
    let repo = SqlxQuoteRepository::new(pool);

    repo.upsert_daily(&record("000001", 4, 10.0)).await.unwrap();

    assert!(repo.fill_net_inflow("000001", day(4), -321.5).await.unwrap());
    assert!(!repo.fill_net_inflow("000001", day(4), 999.0).await.unwrap());

    let stored = repo.get_record("000001", day(4)).await.unwrap().unwrap();
    assert_eq!(stored.net_inflow, Some(-321.5));
    assert_eq!(stored.close, 10.0);
}
