//! 命令行配置提供者
//!
//! 支持的参数形式：
//!
//! - `--key=value`、`--key value`
//! - `/key=value`、`/key value`
//! - `-alias=value`、`-alias value`（单横线参数必须出现在开关映射中）
//!
//! 开关映射把别名映射到规范键，例如 `-p` → `Server:Port`。

use crate::store::FlatKeyStore;
use config_abstractions::{ConfigurationProvider, ConfigurationSource};
use config_common::{fold_key, ConfigError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// 命令行配置源
#[derive(Debug, Clone, Default)]
pub struct CommandLineConfigurationSource {
    /// 命令行参数，不含程序名
    pub args: Vec<String>,
    /// 别名 → 规范键
    pub switch_mappings: Option<HashMap<String, String>>,
}

impl CommandLineConfigurationSource {
    /// 创建命令行配置源
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            switch_mappings: None,
        }
    }

    /// 设置开关映射
    pub fn with_switch_mappings<I, K, V>(mut self, mappings: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.switch_mappings = Some(
            mappings
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }
}

impl ConfigurationSource for CommandLineConfigurationSource {
    fn build(&self) -> Result<Arc<dyn ConfigurationProvider>, ConfigError> {
        let provider = CommandLineConfigurationProvider::new(
            self.args.clone(),
            self.switch_mappings.clone().unwrap_or_default(),
        )?;
        Ok(Arc::new(provider))
    }
}

/// 命令行配置提供者
///
/// 参数在创建时解析，非法参数会在任何提供者加载之前报告。
#[derive(Debug)]
pub struct CommandLineConfigurationProvider {
    parsed: Vec<(String, String)>,
    store: FlatKeyStore,
}

impl CommandLineConfigurationProvider {
    /// 解析命令行参数
    pub fn new<I, S>(args: I, switch_mappings: HashMap<String, String>) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mappings = validate_switch_mappings(switch_mappings)?;
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let parsed = parse_arguments(&args, &mappings)?;
        debug!("解析了 {} 个命令行参数", parsed.len());

        Ok(Self {
            parsed,
            store: FlatKeyStore::new(),
        })
    }
}

impl ConfigurationProvider for CommandLineConfigurationProvider {
    fn load(&self) -> Result<(), ConfigError> {
        self.store.replace(self.parsed.iter().cloned());
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
        "CommandLineConfigurationProvider".to_string()
    }
}

/// 校验开关映射并以归一化别名索引
fn validate_switch_mappings(
    mappings: HashMap<String, String>,
) -> Result<HashMap<String, String>, ConfigError> {
    let mut validated = HashMap::with_capacity(mappings.len());
    for (switch, key) in mappings {
        if !switch.starts_with('-') {
            return Err(ConfigError::InvalidSwitchMapping {
                switch,
                message: "开关必须以 '-' 或 '--' 开头".to_string(),
            });
        }
        if validated.insert(fold_key(&switch), key).is_some() {
            return Err(ConfigError::InvalidSwitchMapping {
                switch,
                message: "开关重复（不区分大小写）".to_string(),
            });
        }
    }
    Ok(validated)
}

fn parse_arguments(
    args: &[String],
    mappings: &HashMap<String, String>,
) -> Result<Vec<(String, String)>, ConfigError> {
    let mut parsed = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let (current, key_start) = if arg.starts_with("--") {
            (arg.clone(), 2)
        } else if arg.starts_with('-') {
            (arg.clone(), 1)
        } else if let Some(rest) = arg.strip_prefix('/') {
            (format!("--{rest}"), 2)
        } else {
            return Err(ConfigError::invalid_argument(
                arg.as_str(),
                "参数必须以 '--'、'-' 或 '/' 开头",
            ));
        };

        let (switch, inline_value) = match current.split_once('=') {
            Some((switch, value)) => (switch.to_string(), Some(value.to_string())),
            None => (current.clone(), None),
        };

        let key = match mappings.get(&fold_key(&switch)) {
            Some(mapped) => mapped.clone(),
            None if key_start == 1 => {
                return Err(ConfigError::invalid_argument(
                    arg.as_str(),
                    "单横线参数没有对应的开关映射",
                ));
            }
            None => switch[key_start..].to_string(),
        };

        if key.is_empty() {
            return Err(ConfigError::invalid_argument(arg.as_str(), "参数键不能为空"));
        }

        let value = match inline_value {
            Some(value) => value,
            None => iter
                .next()
                .cloned()
                .ok_or_else(|| ConfigError::invalid_argument(arg.as_str(), "参数缺少值"))?,
        };

        parsed.push((key, value));
    }

    Ok(parsed)
}
