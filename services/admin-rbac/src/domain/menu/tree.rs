//! 菜单树
//!
//! 节点以物化路径保存祖先关系，树形结构只在读取时按 parent_id 组装。

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::menu::{Menu, MenuId};

/// 路径分隔符
pub const PATH_SEPARATOR: char = '/';

/// 树节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuTree {
    #[serde(flatten)]
    pub menu: Menu,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MenuTree>,
}

/// 拼接子节点路径: 父路径为空时直接返回 id
pub fn join_parent_path(parent_path: &str, id: &str) -> String {
    if parent_path.is_empty() {
        id.to_string()
    } else {
        format!("{parent_path}{PATH_SEPARATOR}{id}")
    }
}

/// `path` 是否等于 `prefix` 或位于其之下
pub fn has_path_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with(PATH_SEPARATOR),
        None => false,
    }
}

/// 替换路径前缀，保留后缀原样；不匹配时返回 None
pub fn replace_path_prefix(path: &str, old_prefix: &str, new_prefix: &str) -> Option<String> {
    if !has_path_prefix(path, old_prefix) {
        return None;
    }
    Some(format!("{new_prefix}{}", &path[old_prefix.len()..]))
}

/// 由平铺节点组装树
///
/// 子节点顺序即输入顺序；父节点不在输入中的非根节点会被丢弃。
pub fn build_tree(flat: Vec<Menu>) -> Vec<MenuTree> {
    let index: HashMap<MenuId, usize> = flat
        .iter()
        .enumerate()
        .map(|(i, menu)| (menu.id, i))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); flat.len()];
    let mut roots = Vec::new();
    for (i, menu) in flat.iter().enumerate() {
        match &menu.parent_id {
            None => roots.push(i),
            Some(parent_id) => {
                if let Some(&parent) = index.get(parent_id) {
                    children[parent].push(i);
                }
            }
        }
    }

    let mut slots: Vec<Option<Menu>> = flat.into_iter().map(Some).collect();
    roots
        .into_iter()
        .filter_map(|i| assemble(i, &children, &mut slots))
        .collect()
}

fn assemble(i: usize, children: &[Vec<usize>], slots: &mut [Option<Menu>]) -> Option<MenuTree> {
    let menu = slots[i].take()?;
    let nodes = children[i]
        .iter()
        .filter_map(|&child| assemble(child, children, slots))
        .collect();
    Some(MenuTree {
        menu,
        children: nodes,
    })
}

/// 先序展开为平铺列表
pub fn flatten(trees: &[MenuTree]) -> Vec<Menu> {
    let mut out = Vec::new();
    let mut stack: Vec<&MenuTree> = trees.iter().rev().collect();
    while let Some(node) = stack.pop() {
        out.push(node.menu.clone());
        stack.extend(node.children.iter().rev());
    }
    out
}

/// 输入节点中缺失的祖先 ID (按出现顺序去重)
pub fn missing_ancestor_ids(menus: &[Menu]) -> Vec<MenuId> {
    let present: HashSet<MenuId> = menus.iter().map(|m| m.id).collect();
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for menu in menus {
        for segment in menu
            .parent_path
            .split(PATH_SEPARATOR)
            .filter(|s| !s.is_empty())
        {
            let Ok(id) = segment.parse::<MenuId>() else {
                continue;
            };
            if !present.contains(&id) && seen.insert(id) {
                ids.push(id);
            }
        }
    }
    ids
}
