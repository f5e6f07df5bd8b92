//! 版本化 SQL 迁移
//!
//! 每个版本在独立事务中执行，并在 `schema_migrations` 中记录 SHA-256 校验和。
//! 多个实例同时启动时由 advisory lock 串行化。已执行版本的 SQL 被改动时只记录，
//! 不重复执行也不中断启动。

use std::collections::{BTreeMap, HashMap};

use backoffice_errors::{AppError, AppResult};
use sha2::{Digest, Sha256};
use sqlx::{PgConnection, PgPool};
use tracing::{info, warn};

use crate::map_sqlx_error;

const MIGRATION_TABLE: &str = "schema_migrations";
const MIGRATION_LOCK_KEY: i64 = 0x6261_636b_6f66_6669;

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub up_sql: String,
    pub checksum: String,
}

impl Migration {
    pub fn new(version: i64, name: impl Into<String>, up_sql: impl Into<String>) -> Self {
        let up_sql = up_sql.into();
        let checksum = checksum(&up_sql);
        Self {
            version,
            name: name.into(),
            up_sql,
            checksum,
        }
    }
}

fn checksum(sql: &str) -> String {
    // 忽略首尾空白，编辑器换行差异不算修改
    hex::encode(Sha256::digest(sql.trim().as_bytes()))
}

/// 按版本排序，版本号重复时报错
fn ordered(migrations: &[Migration]) -> AppResult<Vec<&Migration>> {
    let mut by_version = BTreeMap::new();
    for m in migrations {
        if by_version.insert(m.version, m).is_some() {
            return Err(AppError::internal(format!(
                "Duplicate migration version {}",
                m.version
            )));
        }
    }
    Ok(by_version.into_values().collect())
}

#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub applied: Vec<i64>,
    pub skipped: Vec<i64>,
    /// 校验和与记录不一致的已执行版本
    pub modified: Vec<i64>,
}

/// 对照已记录的校验和划分迁移，返回报告 (applied 为空) 与待执行列表
fn plan<'a>(
    recorded: &HashMap<i64, String>,
    migrations: &[&'a Migration],
) -> (MigrationReport, Vec<&'a Migration>) {
    let mut report = MigrationReport::default();
    let mut pending = Vec::new();
    for &migration in migrations {
        match recorded.get(&migration.version) {
            Some(sum) if sum != &migration.checksum => report.modified.push(migration.version),
            Some(_) => report.skipped.push(migration.version),
            None => pending.push(migration),
        }
    }
    (report, pending)
}

pub struct MigrationManager {
    pool: PgPool,
}

impl MigrationManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 应用所有未执行的迁移，遇到错误立即停止
    pub async fn migrate(&self, migrations: &[Migration]) -> AppResult<MigrationReport> {
        let pending = ordered(migrations)?;

        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

        let result = run(&mut conn, &pending).await;

        if let Err(e) = sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *conn)
            .await
        {
            warn!(error = %e, "Failed to release migration lock");
        }
        result
    }
}

async fn run(conn: &mut PgConnection, migrations: &[&Migration]) -> AppResult<MigrationReport> {
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {MIGRATION_TABLE} (
            version BIGINT PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            checksum VARCHAR(64) NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )"
    ))
    .execute(&mut *conn)
    .await
    .map_err(map_sqlx_error)?;

    let rows: Vec<(i64, String)> =
        sqlx::query_as(&format!("SELECT version, checksum FROM {MIGRATION_TABLE}"))
            .fetch_all(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
    let recorded: HashMap<i64, String> = rows.into_iter().collect();

    let (mut report, pending) = plan(&recorded, migrations);
    for migration in pending {
        apply(conn, migration).await?;
        report.applied.push(migration.version);
    }
    for version in &report.modified {
        warn!(version, "Applied migration was modified afterwards, not re-run");
    }
    Ok(report)
}

async fn apply(conn: &mut PgConnection, migration: &Migration) -> AppResult<()> {
    let mut tx = sqlx::Connection::begin(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

    sqlx::raw_sql(&migration.up_sql)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::database(format!(
                "Migration {} ({}) failed: {}",
                migration.version, migration.name, e
            ))
        })?;

    sqlx::query(&format!(
        "INSERT INTO {MIGRATION_TABLE} (version, name, checksum) VALUES ($1, $2, $3)"
    ))
    .bind(migration.version)
    .bind(&migration.name)
    .bind(&migration.checksum)
    .execute(&mut *tx)
    .await
    .map_err(map_sqlx_error)?;

    tx.commit().await.map_err(map_sqlx_error)?;
    info!(version = migration.version, name = %migration.name, "Migration applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_ignores_surrounding_whitespace() {
        let a = Migration::new(1, "menus", "CREATE TABLE menus (id UUID);");
        let b = Migration::new(1, "menus", "\n  CREATE TABLE menus (id UUID);\n");
        let c = Migration::new(1, "menus", "CREATE TABLE menus (id UUID, name TEXT);");
        assert_eq!(a.checksum, b.checksum);
        assert_ne!(a.checksum, c.checksum);
    }

    #[test]
    fn test_checksum_is_sha256_hex() {
        let m = Migration::new(1, "menus", "CREATE TABLE menus (id UUID);\n");
        assert_eq!(
            m.checksum,
            "a1abd05e581198904d43bad7ec19e81caec6f46b25d00fc525e44f4a2b535549"
        );
    }

    #[test]
    fn test_modified_migration_is_reported_not_fatal() {
        let menus = Migration::new(1, "menus", "CREATE TABLE menus (id UUID);");
        let roles = Migration::new(2, "roles", "CREATE TABLE roles (id UUID);");
        let users = Migration::new(3, "users", "CREATE TABLE users (id UUID);");
        let recorded = HashMap::from([
            (1, menus.checksum.clone()),
            // 旧算法写入的校验和
            (2, "9f2c1d7a00b3e4c5".to_string()),
        ]);

        let (report, pending) = plan(&recorded, &[&menus, &roles, &users]);
        assert_eq!(report.skipped, [1]);
        assert_eq!(report.modified, [2]);
        assert!(report.applied.is_empty());
        assert_eq!(pending.iter().map(|m| m.version).collect::<Vec<_>>(), [3]);
    }

    #[test]
    fn test_ordered_sorts_by_version() {
        let list = vec![
            Migration::new(3, "users", "SELECT 3"),
            Migration::new(1, "menus", "SELECT 1"),
            Migration::new(2, "roles", "SELECT 2"),
        ];
        let versions: Vec<i64> = ordered(&list).unwrap().iter().map(|m| m.version).collect();
        assert_eq!(versions, [1, 2, 3]);
    }

    #[test]
    fn test_duplicate_version_is_rejected() {
        let list = vec![
            Migration::new(1, "menus", "SELECT 1"),
            Migration::new(1, "roles", "SELECT 2"),
        ];
        assert!(ordered(&list).is_err());
    }
}
