//! 内存配置提供者

use crate::store::FlatKeyStore;
use config_abstractions::{ConfigurationProvider, ConfigurationSource};
use config_common::ConfigError;
use std::sync::Arc;

/// 内存配置源
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigurationSource {
    /// 初始数据
    pub initial_data: Vec<(String, String)>,
}

impl MemoryConfigurationSource {
    /// 由键值对创建内存配置源
    pub fn new<I, K, V>(data: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            initial_data: data
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl ConfigurationSource for MemoryConfigurationSource {
    fn build(&self) -> Result<Arc<dyn ConfigurationProvider>, ConfigError> {
        Ok(Arc::new(MemoryConfigurationProvider::new(
            self.initial_data.clone(),
        )))
    }
}

/// 内存配置提供者
///
/// 没有外部数据源，`load` 保留当前数据不变。
#[derive(Debug, Default)]
pub struct MemoryConfigurationProvider {
    store: FlatKeyStore,
}

impl MemoryConfigurationProvider {
    /// 创建内存配置提供者
    pub fn new<I, K, V>(data: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            store: FlatKeyStore::from_entries(data),
        }
    }

    /// 当前数据的条目数
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// 是否没有数据
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl ConfigurationProvider for MemoryConfigurationProvider {
    fn load(&self) -> Result<(), ConfigError> {
        Ok(())
    }

    fn try_get(&self, key: &str) -> Option<String> {
        self.store.get(key)
    }

    fn set(&self, key: &str, value: &str) {
        self.store.set(key, value);
    }

    fn get_child_keys(&self, earlier_keys: Vec<String>, parent_path: Option<&str>) -> Vec<String> {
        self.store.child_keys(earlier_keys, parent_path)
    }

    fn name(&self) -> String {
        "MemoryConfigurationProvider".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_keeps_data_and_writes() {
        let provider = MemoryConfigurationProvider::new([("Key", "value")]);
        provider.set("Other", "written");
        provider.load().unwrap();
        provider.load().unwrap();
        assert_eq!(provider.try_get("key").as_deref(), Some("value"));
        assert_eq!(provider.try_get("other").as_deref(), Some("written"));
        assert_eq!(provider.len(), 2);
    }

    #[test]
    fn test_reload_token_never_fires() {
        let provider = MemoryConfigurationProvider::default();
        let token = provider.get_reload_token();
        assert!(!token.has_changed());
        assert!(!token.active_change_callbacks());
    }
}
