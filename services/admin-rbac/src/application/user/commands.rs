//! 用户相关命令定义

use secrecy::Secret;
use serde::Deserialize;

use crate::domain::Status;
use crate::domain::role::RoleId;

/// 创建用户命令
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserCommand {
    pub username: String,
    pub real_name: String,
    pub password: Secret<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub role_ids: Vec<RoleId>,
    #[serde(skip)]
    pub performed_by: String,
}

/// 更新用户命令；`password` 为空时保留原密码
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateUserCommand {
    pub username: String,
    pub real_name: String,
    #[serde(default)]
    pub password: Option<Secret<String>>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub role_ids: Vec<RoleId>,
}

/// 超级管理员
///
/// 不落库，ID 即用户名，拥有全部菜单并跳过鉴权。
#[derive(Debug, Clone)]
pub struct SuperAdmin {
    pub username: String,
    pub real_name: String,
    pub password: Secret<String>,
}

/// 当前用户信息
#[derive(Debug, Clone, serde::Serialize)]
pub struct UserInfo {
    pub user_id: String,
    pub username: String,
    pub real_name: String,
    pub roles: Vec<crate::domain::role::Role>,
}
