//! PostgreSQL 连接池

use std::str::FromStr;
use std::time::Duration;

use backoffice_errors::{AppError, AppResult};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::info;

/// 连接池参数
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
    /// 写入 `pg_stat_activity.application_name`，便于定位后台连接
    pub application_name: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl PostgresConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            application_name: "backoffice".to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        // 下限不超过上限
        self.min_connections = self.min_connections.min(max);
        self
    }

    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    fn connect_options(&self) -> AppResult<PgConnectOptions> {
        let options = PgConnectOptions::from_str(&self.url)
            .map_err(|e| AppError::database(format!("Invalid database url: {}", e)))?;
        Ok(options.application_name(&self.application_name))
    }
}

/// 建立连接池，连接失败直接返回错误
pub async fn create_pool(config: &PostgresConfig) -> AppResult<PgPool> {
    let options = config.connect_options()?;
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect_with(options)
        .await
        .map_err(|e| AppError::database(format!("Failed to create pool: {}", e)))?;

    info!(
        application = %config.application_name,
        max_connections = config.max_connections,
        "PostgreSQL pool ready"
    );
    Ok(pool)
}

/// 探测数据库可用性，返回服务端版本号
pub async fn check_connection(pool: &PgPool) -> AppResult<String> {
    sqlx::query_scalar::<_, String>("SHOW server_version")
        .fetch_one(pool)
        .await
        .map_err(|e| AppError::database(format!("Database health check failed: {}", e)))
}
