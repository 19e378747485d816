//! 配置节视图

use crate::binder;
use crate::root::CompositeConfiguration;
use config_abstractions::{Configuration, ConfigurationSection};
use config_common::{ChangeToken, ConfigError, ConfigurationPath};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// 配置节
///
/// 由根配置和路径前缀组成，读写都转发给根配置，因此总能看到最新的合并结果。
/// 路径为空时表示根视图。
#[derive(Clone)]
pub struct Section {
    root: CompositeConfiguration,
    path: String,
    key: String,
}

impl Section {
    pub(crate) fn new(root: CompositeConfiguration, path: String) -> Self {
        let key = ConfigurationPath::get_section_key(&path).to_string();
        Self { root, path, key }
    }

    /// 所属的根配置
    pub fn root(&self) -> &CompositeConfiguration {
        &self.root
    }

    /// 是否为根视图
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// 把配置节绑定为类型化对象
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        binder::bind(self)
    }

    fn full_key(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            ConfigurationPath::combine([self.path.as_str(), key])
        }
    }
}

impl Configuration for Section {
    type Section = Section;

    fn get(&self, key: &str) -> Option<String> {
        self.root.get(&self.full_key(key))
    }

    fn set(&self, key: &str, value: &str) {
        self.root.set(&self.full_key(key), value);
    }

    fn get_section(&self, key: &str) -> Section {
        Section::new(self.root.clone(), self.full_key(key))
    }

    fn get_children(&self) -> Vec<Section> {
        if self.path.is_empty() {
            self.root.sections_under(None)
        } else {
            self.root.sections_under(Some(&self.path))
        }
    }

    fn get_reload_token(&self) -> Arc<dyn ChangeToken> {
        self.root.get_reload_token()
    }
}

impl ConfigurationSection for Section {
    fn key(&self) -> &str {
        &self.key
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn value(&self) -> Option<String> {
        if self.path.is_empty() {
            None
        } else {
            self.root.get(&self.path)
        }
    }

    fn set_value(&self, value: &str) {
        if !self.path.is_empty() {
            self.root.set(&self.path, value);
        }
    }
}

impl std::fmt::Debug for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Section")
            .field("path", &self.path)
            .field("value", &self.value())
            .finish()
    }
}
