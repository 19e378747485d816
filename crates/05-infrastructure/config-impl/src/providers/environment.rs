//! 环境变量配置提供者

use crate::store::FlatKeyStore;
use config_abstractions::{ConfigurationProvider, ConfigurationSource};
use config_common::{keys_equal, ConfigError, KEY_DELIMITER};
use std::sync::Arc;
use tracing::{debug, warn};

/// 环境变量名中的层级分隔符
pub const ENVIRONMENT_KEY_SEPARATOR: &str = "__";

/// 环境变量配置源
#[derive(Debug, Clone, Default)]
pub struct EnvironmentVariablesConfigurationSource {
    /// 变量名前缀，匹配时忽略大小写，加载后去除
    pub prefix: Option<String>,
    /// 替代进程环境的变量列表
    pub variables: Option<Vec<(String, String)>>,
}

impl EnvironmentVariablesConfigurationSource {
    /// 读取进程环境变量
    pub fn new(prefix: Option<String>) -> Self {
        Self {
            prefix,
            variables: None,
        }
    }

    /// 使用给定的变量列表代替进程环境
    pub fn with_variables<I, K, V>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.variables = Some(
            variables
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }
}

impl ConfigurationSource for EnvironmentVariablesConfigurationSource {
    fn build(&self) -> Result<Arc<dyn ConfigurationProvider>, ConfigError> {
        Ok(Arc::new(EnvironmentVariablesConfigurationProvider {
            prefix: self.prefix.as_deref().map(normalize_name),
            variables: self.variables.clone(),
            store: FlatKeyStore::new(),
        }))
    }
}

/// 环境变量配置提供者
///
/// 变量名中的 `__` 被转换为 `:`，例如 `Logging__Level` 对应 `Logging:Level`。
#[derive(Debug)]
pub struct EnvironmentVariablesConfigurationProvider {
    prefix: Option<String>,
    variables: Option<Vec<(String, String)>>,
    store: FlatKeyStore,
}

impl EnvironmentVariablesConfigurationProvider {
    /// 创建读取进程环境的提供者
    pub fn new(prefix: Option<&str>) -> Self {
        Self {
            prefix: prefix.map(normalize_name),
            variables: None,
            store: FlatKeyStore::new(),
        }
    }

    fn read_variables(&self) -> Vec<(String, String)> {
        if let Some(variables) = &self.variables {
            return variables.clone();
        }

        let mut variables = Vec::new();
        for (name, value) in std::env::vars_os() {
            match (name.into_string(), value.into_string()) {
                (Ok(name), Ok(value)) => variables.push((name, value)),
                (name, _) => {
                    warn!("跳过非 UTF-8 环境变量: {:?}", name);
                }
            }
        }
        variables
    }

    /// 把变量名转换为配置键，不匹配前缀时返回 `None`
    fn to_config_key(&self, name: &str) -> Option<String> {
        let key = normalize_name(name);
        match &self.prefix {
            None => Some(key),
            Some(prefix) => {
                let head = key.get(..prefix.len())?;
                if keys_equal(head, prefix) {
                    Some(key[prefix.len()..].to_string())
                } else {
                    None
                }
            }
        }
    }
}

impl ConfigurationProvider for EnvironmentVariablesConfigurationProvider {
    fn load(&self) -> Result<(), ConfigError> {
        let entries: Vec<(String, String)> = self
            .read_variables()
            .into_iter()
            .filter_map(|(name, value)| {
                self.to_config_key(&name)
                    .filter(|key| !key.is_empty())
                    .map(|key| (key, value))
            })
            .collect();

        debug!(
            "加载了 {} 个环境变量，前缀: {:?}",
            entries.len(),
            self.prefix
        );
        self.store.replace(entries);
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
        match &self.prefix {
            Some(prefix) => format!("EnvironmentVariablesConfigurationProvider(prefix: '{prefix}')"),
            None => "EnvironmentVariablesConfigurationProvider".to_string(),
        }
    }
}

fn normalize_name(name: &str) -> String {
    name.replace(ENVIRONMENT_KEY_SEPARATOR, KEY_DELIMITER)
}
