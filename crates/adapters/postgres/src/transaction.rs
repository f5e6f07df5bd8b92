//! PostgreSQL 事务

use backoffice_errors::{AppError, AppResult};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

/// 持有连接池并开启 `'static` 事务
///
/// 事务未提交就被丢弃时，连接归还连接池前由 sqlx 回滚。
#[derive(Clone)]
pub struct TransactionManager {
    pool: PgPool,
}

impl TransactionManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {}", e)))?;
        debug!("Transaction started");
        Ok(tx)
    }

    pub async fn commit(tx: Transaction<'static, Postgres>) -> AppResult<()> {
        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit transaction: {}", e)))
    }

    pub async fn rollback(tx: Transaction<'static, Postgres>) -> AppResult<()> {
        tx.rollback()
            .await
            .map_err(|e| AppError::database(format!("Failed to rollback transaction: {}", e)))
    }
}
