use sqlx::AnyPool;

pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    // Monitored universe
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS symbols (
  code TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  region TEXT NOT NULL,
  kind TEXT NOT NULL,
  active INTEGER NOT NULL CHECK (active IN (0,1)),
  tags TEXT NULL,
  updated_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // One row per (symbol, trading day) with the full indicator state
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS daily_records (
  symbol TEXT NOT NULL,
  day TEXT NOT NULL,
  name TEXT NOT NULL,

  open REAL NOT NULL,
  high REAL NOT NULL,
  low REAL NOT NULL,
  close REAL NOT NULL,
  prior_close REAL NOT NULL,
  volume BIGINT NOT NULL,
  turnover_rate REAL NULL,

  ma5 REAL NOT NULL,
  ma10 REAL NOT NULL,
  ma20 REAL NOT NULL,

  ema_short REAL NOT NULL,
  ema_long REAL NOT NULL,
  diff REAL NOT NULL,
  signal_line REAL NOT NULL,

  kdj_k REAL NOT NULL,
  kdj_d REAL NOT NULL,
  kdj_j REAL NOT NULL,

  trix_ema1 REAL NOT NULL,
  trix_ema2 REAL NOT NULL,
  trix_ema3 REAL NOT NULL,
  trix REAL NOT NULL,
  trix_ma REAL NOT NULL,

  boll_upper REAL NOT NULL,
  boll_lower REAL NOT NULL,

  volume_ratio REAL NOT NULL,
  net_inflow REAL NULL,

  updated_ms BIGINT NOT NULL,
  PRIMARY KEY (symbol, day)
);
"#,
    )
    .execute(pool)
    .await?;

    // Append-only intraday volume observations
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS volume_samples (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  symbol TEXT NOT NULL,
  bucket TEXT NOT NULL,
  volume BIGINT NOT NULL,
  price REAL NOT NULL,
  observed_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_volume_samples_bucket ON volume_samples(symbol, bucket, observed_ms);"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_symbols_active ON symbols(active);"#)
        .execute(pool)
        .await?;

    Ok(())
}
