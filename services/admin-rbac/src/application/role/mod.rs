//! 角色应用层模块

pub mod commands;
pub mod service;

pub use commands::{RoleCommand, RoleMenuInput};
pub use service::RoleService;
