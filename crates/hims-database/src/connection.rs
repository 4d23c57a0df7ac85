//! 数据库连接管理

use hims_core::{HimsError, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// 数据库连接池
#[derive(Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// 连接到PostgreSQL
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| HimsError::Database(e.to_string()))?;

        tracing::info!("Connected to database");
        Ok(Self { pool })
    }

    /// 底层连接池
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
