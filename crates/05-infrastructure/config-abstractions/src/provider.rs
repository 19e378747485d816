//! 配置提供者抽象接口

use config_common::{ChangeToken, ConfigError, NeverChangeToken};
use std::sync::Arc;

/// 配置提供者 trait
///
/// 提供者从单一数据源加载配置，并以扁平的“层级键 → 字符串值”形式对外暴露。
/// 所有方法都只需要共享引用，提供者内部负责同步。
pub trait ConfigurationProvider: Send + Sync {
    /// 完整读取数据源并替换提供者内部的数据
    ///
    /// 多次调用是幂等的；失败时保留之前的数据。
    fn load(&self) -> Result<(), ConfigError>;

    /// 不区分大小写地查找配置值
    fn try_get(&self, key: &str) -> Option<String>;

    /// 写入配置值，只影响提供者本地数据
    fn set(&self, key: &str, value: &str);

    /// 获取 `parent_path` 下的直接子段名
    ///
    /// 返回值由 `earlier_keys` 和本提供者的子段名组成，并按配置键规则稳定排序，
    /// 因此与先前提供者重复（忽略大小写）的名称排在后面。
    fn get_child_keys(&self, earlier_keys: Vec<String>, parent_path: Option<&str>) -> Vec<String>;

    /// 获取重载令牌
    ///
    /// 没有可变数据源的提供者返回永不触发的令牌。
    fn get_reload_token(&self) -> Arc<dyn ChangeToken> {
        Arc::new(NeverChangeToken)
    }

    /// 获取提供者名称
    fn name(&self) -> String;
}

/// 配置源 trait
///
/// 配置源描述数据从哪里来，并在构建阶段创建对应的提供者。
pub trait ConfigurationSource: Send + Sync {
    /// 创建配置提供者，此时不加载数据
    fn build(&self) -> Result<Arc<dyn ConfigurationProvider>, ConfigError>;
}
