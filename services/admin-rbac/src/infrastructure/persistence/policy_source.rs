//! 从数据库加载授权规则

use async_trait::async_trait;
use backoffice_adapter_postgres::map_sqlx_error;
use backoffice_errors::AppResult;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::policy::{GroupingRule, PermissionRule, PolicyRules, PolicySource};

/// 基于连接池的规则来源，只读取已提交的数据
pub struct PostgresPolicySource {
    pool: PgPool,
}

impl PostgresPolicySource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PolicySource for PostgresPolicySource {
    async fn load_rules(&self) -> AppResult<PolicyRules> {
        let permissions = sqlx::query_as::<_, (Uuid, String, String)>(
            r#"
            SELECT DISTINCT rm.role_id, ar.path, ar.method
            FROM role_menus rm
            JOIN roles r ON r.id = rm.role_id AND r.status = 1
            JOIN action_resources ar ON ar.action_id = rm.action_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .into_iter()
        .map(|(role, path, method)| PermissionRule {
            role: role.to_string(),
            path,
            method,
        })
        .collect();

        let groupings = sqlx::query_as::<_, (Uuid, Uuid)>(
            r#"
            SELECT DISTINCT ur.user_id, ur.role_id
            FROM user_roles ur
            JOIN users u ON u.id = ur.user_id AND u.status = 1
            JOIN roles r ON r.id = ur.role_id AND r.status = 1
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .into_iter()
        .map(|(user, role)| GroupingRule {
            user: user.to_string(),
            role: role.to_string(),
        })
        .collect();

        Ok(PolicyRules {
            permissions,
            groupings,
        })
    }
}
