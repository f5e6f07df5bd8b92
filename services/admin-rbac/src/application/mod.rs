//! 应用层模块

pub mod authorization;
pub mod menu;
pub mod role;
pub mod user;

pub use authorization::{PolicyEnforcer, spawn_auto_reload};
pub use menu::{ActionInput, ListMenusQuery, MenuCommand, MenuListResult, MenuSeed, MenuService};
pub use role::{RoleCommand, RoleMenuInput, RoleService};
pub use user::{CreateUserCommand, SuperAdmin, UpdateUserCommand, UserInfo, UserService};
