//! 配置视图抽象接口

use crate::provider::ConfigurationProvider;
use config_common::{ChangeToken, ConfigError};
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

/// 配置视图 trait
///
/// 既可以是整个合并后的配置，也可以是某个配置节。
pub trait Configuration: Send + Sync {
    /// 配置节类型
    type Section: ConfigurationSection;

    /// 获取配置值
    fn get(&self, key: &str) -> Option<String>;

    /// 写入配置值
    fn set(&self, key: &str, value: &str);

    /// 获取配置节
    fn get_section(&self, key: &str) -> Self::Section;

    /// 获取直接子配置节
    fn get_children(&self) -> Vec<Self::Section>;

    /// 获取重载令牌
    fn get_reload_token(&self) -> Arc<dyn ChangeToken>;

    /// 获取并转换配置值
    fn get_value<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| ConfigError::TypeConversionError {
                    key: key.to_string(),
                    message: format!("无法将 '{}' 转换为 {}: {}", raw, std::any::type_name::<T>(), e),
                }),
            None => Ok(None),
        }
    }
}

/// 配置节 trait
pub trait ConfigurationSection: Configuration + Clone {
    /// 配置节在父节点中的键
    fn key(&self) -> &str;

    /// 配置节的完整路径
    fn path(&self) -> &str;

    /// 配置节自身的值
    fn value(&self) -> Option<String>;

    /// 写入配置节自身的值
    fn set_value(&self, value: &str);

    /// 配置节是否存在（有值或有子节点）
    fn exists(&self) -> bool {
        self.value().is_some() || !self.get_children().is_empty()
    }
}

/// 顶层配置 trait
pub trait ConfigurationRoot: Configuration {
    /// 重新加载所有提供者
    fn reload(&self) -> Result<(), ConfigError>;

    /// 按注册顺序排列的提供者
    fn providers(&self) -> &[Arc<dyn ConfigurationProvider>];
}
