//! 用户领域模块

#![allow(clippy::module_inception)]

pub mod password;
pub mod repository;
pub mod user;

pub use password::{HashedPassword, PasswordError, plain_matches};
pub use repository::{UserRepository, UserRoleRepository};
pub use user::{User, UserId, UserQuery, UserRole, UserRoleId};
