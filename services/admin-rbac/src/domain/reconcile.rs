//! 嵌套集合差异对比
//!
//! 以自然键 (而非代理 ID) 对比新旧两组集合，拆分为新增、删除、更新三部分。
//! 同一集合中自然键重复时，后出现的元素覆盖先出现的元素，位置沿用第一次出现的位置。

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// 具有自然键的元素
pub trait Keyed {
    type Key: Ord + Clone + std::fmt::Debug;

    fn natural_key(&self) -> Self::Key;
}

/// 对比结果
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation<T> {
    /// 仅存在于新集合
    pub to_add: Vec<T>,
    /// 仅存在于旧集合
    pub to_remove: Vec<T>,
    /// 两边都存在: (旧, 新)
    pub to_update: Vec<(T, T)>,
}

impl<T> Default for Reconciliation<T> {
    fn default() -> Self {
        Self {
            to_add: Vec::new(),
            to_remove: Vec::new(),
            to_update: Vec::new(),
        }
    }
}

impl<T> Reconciliation<T> {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty() && self.to_update.is_empty()
    }
}

/// 自然键到元素的有序映射
pub struct KeyedMap<T: Keyed> {
    entries: BTreeMap<T::Key, (usize, T)>,
}

impl<T: Keyed> KeyedMap<T> {
    pub fn build(items: impl IntoIterator<Item = T>) -> Self {
        let mut entries = BTreeMap::new();
        for (position, item) in items.into_iter().enumerate() {
            match entries.entry(item.natural_key()) {
                Entry::Occupied(mut slot) => {
                    let (_, existing): &mut (usize, T) = slot.get_mut();
                    *existing = item;
                }
                Entry::Vacant(slot) => {
                    slot.insert((position, item));
                }
            }
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.entries.get(key).map(|(_, item)| item)
    }

    pub fn remove(&mut self, key: &T::Key) -> Option<T> {
        self.entries.remove(key).map(|(_, item)| item)
    }

    /// 按首次出现的位置输出
    pub fn into_ordered(self) -> Vec<T> {
        let mut items: Vec<_> = self.entries.into_values().collect();
        items.sort_by_key(|(position, _)| *position);
        items.into_iter().map(|(_, item)| item).collect()
    }
}

/// 对比新旧集合
pub fn reconcile<T: Keyed>(old: Vec<T>, new: Vec<T>) -> Reconciliation<T> {
    let mut old_map = KeyedMap::build(old);
    let new_items = KeyedMap::build(new).into_ordered();

    let mut result = Reconciliation::default();
    for item in new_items {
        match old_map.remove(&item.natural_key()) {
            Some(existing) => result.to_update.push((existing, item)),
            None => result.to_add.push(item),
        }
    }
    result.to_remove = old_map.into_ordered();
    result
}

/// 集合中重复出现的自然键
pub fn duplicate_keys<T: Keyed>(items: &[T]) -> Vec<T::Key> {
    let mut seen = BTreeMap::new();
    let mut duplicates = Vec::new();
    for item in items {
        let key = item.natural_key();
        let count = seen.entry(key.clone()).or_insert(0usize);
        *count += 1;
        if *count == 2 {
            duplicates.push(key);
        }
    }
    duplicates
}
