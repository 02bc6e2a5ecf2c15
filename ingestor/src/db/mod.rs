pub mod schema;

use std::sync::Arc;

use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;

use crate::store::SqlxQuoteRepository;

/// Reads can run concurrently; writes are serialized by the write queue.
const MAX_CONNECTIONS: u32 = 8;

#[derive(Clone)]
pub struct Db {
    pub pool: AnyPool,
}

impl Db {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        schema::migrate(&self.pool).await
    }

    pub fn quote_repository(&self) -> Arc<SqlxQuoteRepository> {
        Arc::new(SqlxQuoteRepository::new(self.pool.clone()))
    }
}
