//! 链式配置提供者

use crate::root::CompositeConfiguration;
use config_abstractions::{
    Configuration, ConfigurationProvider, ConfigurationSection, ConfigurationSource,
};
use config_common::{compare_keys, ChangeToken, ConfigError};
use std::sync::Arc;

/// 链式配置源
#[derive(Debug, Clone)]
pub struct ChainedConfigurationSource {
    /// 被接入的配置
    pub configuration: CompositeConfiguration,
}

impl ChainedConfigurationSource {
    /// 创建链式配置源
    pub fn new(configuration: CompositeConfiguration) -> Self {
        Self { configuration }
    }
}

impl ConfigurationSource for ChainedConfigurationSource {
    fn build(&self) -> Result<Arc<dyn ConfigurationProvider>, ConfigError> {
        Ok(Arc::new(ChainedConfigurationProvider {
            configuration: self.configuration.clone(),
        }))
    }
}

/// 把已有的组合配置作为一个提供者
///
/// 读写直接转发给被接入的配置，重载令牌也是它的令牌。
#[derive(Debug)]
pub struct ChainedConfigurationProvider {
    configuration: CompositeConfiguration,
}

impl ChainedConfigurationProvider {
    /// 被接入的配置
    pub fn configuration(&self) -> &CompositeConfiguration {
        &self.configuration
    }
}

impl ConfigurationProvider for ChainedConfigurationProvider {
    fn load(&self) -> Result<(), ConfigError> {
        Ok(())
    }

    fn try_get(&self, key: &str) -> Option<String> {
        self.configuration.get(key)
    }

    fn set(&self, key: &str, value: &str) {
        self.configuration.set(key, value);
    }

    fn get_child_keys(&self, earlier_keys: Vec<String>, parent_path: Option<&str>) -> Vec<String> {
        let children = match parent_path {
            Some(path) => self.configuration.get_section(path).get_children(),
            None => self.configuration.get_children(),
        };

        let mut keys = earlier_keys;
        keys.extend(children.iter().map(|section| section.key().to_string()));
        keys.sort_by(|a, b| compare_keys(a, b));
        keys
    }

    fn get_reload_token(&self) -> Arc<dyn ChangeToken> {
        self.configuration.get_reload_token()
    }

    fn name(&self) -> String {
        "ChainedConfigurationProvider".to_string()
    }
}
