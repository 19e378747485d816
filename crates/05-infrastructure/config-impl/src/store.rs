//! 扁平键值存储
//!
//! 每个提供者持有一个 [`FlatKeyStore`]。读取方直接加载当前快照，不需要加锁；
//! 写入方在提供者本地的互斥锁下构建完整的新映射后原子替换，
//! 因此读取方永远不会观察到构建到一半的数据。

use arc_swap::ArcSwap;
use config_common::{compare_keys, fold_key, ConfigurationPath};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// 存储条目，保留键的原始大小写
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    /// 原始键
    pub key: String,
    /// 配置值
    pub value: String,
}

/// 以归一化键索引的映射
pub type KeyMap = HashMap<String, StoreEntry>;

/// 扁平键值存储
#[derive(Debug)]
pub struct FlatKeyStore {
    data: ArcSwap<KeyMap>,
    write_lock: Mutex<()>,
}

impl FlatKeyStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self {
            data: ArcSwap::from_pointee(KeyMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// 由键值对创建存储
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        store.replace(entries);
        store
    }

    /// 不区分大小写地读取值
    pub fn get(&self, key: &str) -> Option<String> {
        self.data
            .load()
            .get(&fold_key(key))
            .map(|entry| entry.value.clone())
    }

    /// 写入单个值
    pub fn set(&self, key: &str, value: &str) {
        let _guard = self.write_lock.lock();
        let mut next = KeyMap::clone(&self.data.load());
        next.insert(
            fold_key(key),
            StoreEntry {
                key: key.to_string(),
                value: value.to_string(),
            },
        );
        self.data.store(Arc::new(next));
    }

    /// 用一组键值对整体替换存储内容
    ///
    /// 同一批数据中重复的键（忽略大小写）以最后一次出现为准。
    pub fn replace<I, K, V>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut next = KeyMap::new();
        for (key, value) in entries {
            let key = key.into();
            next.insert(
                fold_key(&key),
                StoreEntry {
                    key,
                    value: value.into(),
                },
            );
        }

        let _guard = self.write_lock.lock();
        self.data.store(Arc::new(next));
    }

    /// 当前快照
    pub fn snapshot(&self) -> Arc<KeyMap> {
        self.data.load_full()
    }

    /// 条目数量
    pub fn len(&self) -> usize {
        self.data.load().len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.data.load().is_empty()
    }

    /// 按配置键规则排序的全部条目
    pub fn entries(&self) -> Vec<StoreEntry> {
        let mut entries: Vec<StoreEntry> = self.data.load().values().cloned().collect();
        entries.sort_by(|a, b| compare_keys(&a.key, &b.key));
        entries
    }

    /// 合并 `earlier_keys` 与本存储在 `parent_path` 下的直接子段名
    pub fn child_keys(&self, earlier_keys: Vec<String>, parent_path: Option<&str>) -> Vec<String> {
        let snapshot = self.data.load();
        let mut seen = HashSet::new();
        let mut own: Vec<String> = Vec::new();
        for entry in snapshot.values() {
            if let Some(child) = ConfigurationPath::immediate_child(&entry.key, parent_path) {
                if seen.insert(fold_key(child)) {
                    own.push(child.to_string());
                }
            }
        }

        let mut keys = earlier_keys;
        keys.extend(own);
        keys.sort_by(|a, b| compare_keys(a, b));
        keys
    }
}

impl Default for FlatKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_common::keys_equal;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let store = FlatKeyStore::from_entries([("Logging:Level", "Info")]);
        assert_eq!(store.get("logging:level").as_deref(), Some("Info"));
        assert_eq!(store.get("LOGGING:LEVEL").as_deref(), Some("Info"));
        assert_eq!(store.get("Logging"), None);
    }

    #[test]
    fn test_duplicate_keys_last_write_wins() {
        let store = FlatKeyStore::from_entries([("a:B", "1"), ("A:b", "2")]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a:b").as_deref(), Some("2"));
    }

    #[test]
    fn test_replace_discards_previous_state() {
        let store = FlatKeyStore::from_entries([("old", "1")]);
        store.replace([("new", "2")]);
        assert_eq!(store.get("old"), None);
        assert_eq!(store.get("new").as_deref(), Some("2"));
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let store = FlatKeyStore::from_entries([("key", "before")]);
        let snapshot = store.snapshot();
        store.set("key", "after");
        assert_eq!(snapshot.get("key").map(|e| e.value.as_str()), Some("before"));
        assert_eq!(store.get("key").as_deref(), Some("after"));
    }

    #[test]
    fn test_child_keys_are_sorted_and_distinct() {
        let store = FlatKeyStore::from_entries([
            ("Settings:Theme", "dark"),
            ("Settings:theme:Accent", "blue"),
            ("Settings:Items:10", "x"),
            ("Settings:Items:2", "y"),
            ("Other", "z"),
        ]);

        let root = store.child_keys(Vec::new(), None);
        assert_eq!(root, vec!["Other", "Settings"]);

        let items = store.child_keys(Vec::new(), Some("settings:items"));
        assert_eq!(items, vec!["2", "10"]);

        let settings = store.child_keys(vec!["Alpha".to_string()], Some("Settings"));
        assert_eq!(settings.len(), 3);
        assert_eq!(settings[0], "Alpha");
        assert!(keys_equal(&settings[2], "Theme"));
    }
}
