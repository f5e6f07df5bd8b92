//! 权限规则来源
//!
//! 权限规则由 用户角色 × 角色菜单 × 动作资源 推导，只读取已提交的数据。

use async_trait::async_trait;
use backoffice_errors::AppResult;

/// 角色对接口的授权: p = (role, path, method)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PermissionRule {
    pub role: String,
    pub path: String,
    pub method: String,
}

/// 用户所属角色: g = (user, role)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupingRule {
    pub user: String,
    pub role: String,
}

/// 完整规则集
#[derive(Debug, Clone, Default)]
pub struct PolicyRules {
    pub permissions: Vec<PermissionRule>,
    pub groupings: Vec<GroupingRule>,
}

/// 规则来源
///
/// 只有启用的角色和启用的用户参与计算。
#[async_trait]
pub trait PolicySource: Send + Sync {
    async fn load_rules(&self) -> AppResult<PolicyRules>;
}
