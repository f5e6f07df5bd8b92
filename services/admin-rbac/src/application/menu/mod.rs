//! 菜单应用层模块

pub mod commands;
pub mod service;

pub use commands::{
    ActionInput, ListMenusQuery, MenuCommand, MenuListResult, MenuSeed, ResourceInput,
};
pub use service::MenuService;
