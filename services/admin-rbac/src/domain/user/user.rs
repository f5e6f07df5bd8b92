//! 用户实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::password::HashedPassword;
use crate::domain::reconcile::Keyed;
use crate::domain::role::RoleId;
use crate::domain::{Status, define_id};

define_id!(UserId);
define_id!(UserRoleId);

/// 用户实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub real_name: String,
    #[serde(skip)]
    pub password: Option<HashedPassword>,
    pub email: String,
    pub phone: String,
    pub status: Status,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub user_roles: Vec<UserRole>,
}

impl User {
    pub fn new(username: impl Into<String>, real_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            username: username.into(),
            real_name: real_name.into(),
            password: None,
            email: String::new(),
            phone: String::new(),
            status: Status::Enabled,
            created_by: String::new(),
            created_at: now,
            updated_at: now,
            user_roles: Vec::new(),
        }
    }
}

/// 用户查询条件
#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    /// 用户名精确匹配
    pub username: Option<String>,
    /// 姓名精确匹配
    pub real_name: Option<String>,
    /// 用户名、姓名、电话或邮箱包含该值，按字面匹配
    pub keyword: Option<String>,
    /// 绑定了其中任一角色
    pub role_ids: Vec<RoleId>,
    pub status: Option<Status>,
}

impl UserQuery {
    pub fn matches(&self, user: &User, user_roles: &[UserRole]) -> bool {
        if self.username.as_ref().is_some_and(|v| &user.username != v) {
            return false;
        }
        if self.real_name.as_ref().is_some_and(|v| &user.real_name != v) {
            return false;
        }
        if let Some(keyword) = &self.keyword {
            let keyword = keyword.as_str();
            let hit = [&user.username, &user.real_name, &user.phone, &user.email]
                .iter()
                .any(|field| field.contains(keyword));
            if !hit {
                return false;
            }
        }
        if !self.role_ids.is_empty() {
            let bound = user_roles
                .iter()
                .any(|b| b.user_id == user.id && self.role_ids.contains(&b.role_id));
            if !bound {
                return false;
            }
        }
        self.status.is_none_or(|status| user.status == status)
    }
}

/// 用户角色绑定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRole {
    pub id: UserRoleId,
    pub user_id: UserId,
    pub role_id: RoleId,
}

impl UserRole {
    pub fn new(user_id: UserId, role_id: RoleId) -> Self {
        Self {
            id: UserRoleId::new(),
            user_id,
            role_id,
        }
    }
}

impl Keyed for UserRole {
    type Key = RoleId;

    fn natural_key(&self) -> RoleId {
        self.role_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_keyword_covers_contact_fields() {
        let mut user = User::new("alice", "Alice Liu");
        user.email = "alice@example.com".into();
        user.phone = "13800138000".into();
        let query = |keyword: &str| UserQuery {
            keyword: Some(keyword.to_string()),
            ..Default::default()
        };
        assert!(query("Liu").matches(&user, &[]));
        assert!(query("example.com").matches(&user, &[]));
        assert!(query("0013").matches(&user, &[]));
        assert!(!query("a%e").matches(&user, &[]));
    }

    #[test]
    fn test_query_by_role_ids() {
        let user = User::new("bob", "Bob");
        let (viewer, editor) = (RoleId::new(), RoleId::new());
        let bindings = [UserRole::new(user.id, viewer)];

        let query = UserQuery {
            role_ids: vec![editor, viewer],
            ..Default::default()
        };
        assert!(query.matches(&user, &bindings));

        let query = UserQuery {
            role_ids: vec![editor],
            ..Default::default()
        };
        assert!(!query.matches(&user, &bindings));
    }
}
