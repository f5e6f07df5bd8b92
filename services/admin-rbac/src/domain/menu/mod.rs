//! 菜单领域模块

#![allow(clippy::module_inception)]

pub mod menu;
pub mod repository;
pub mod tree;

pub use menu::{ActionId, ActionResource, Menu, MenuAction, MenuId, MenuQuery, ResourceId};
pub use repository::{ActionResourceRepository, MenuActionRepository, MenuRepository};
pub use tree::{
    MenuTree, build_tree, flatten, has_path_prefix, join_parent_path, missing_ancestor_ids,
    replace_path_prefix,
};
