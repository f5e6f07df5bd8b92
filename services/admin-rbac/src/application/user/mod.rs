//! 用户应用层模块

pub mod commands;
pub mod service;

pub use commands::{CreateUserCommand, SuperAdmin, UpdateUserCommand, UserInfo};
pub use service::UserService;
