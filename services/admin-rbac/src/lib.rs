//! admin-rbac - 后台菜单、角色、用户与权限执行

pub mod api;
pub mod application;
pub mod domain;
pub mod infrastructure;
