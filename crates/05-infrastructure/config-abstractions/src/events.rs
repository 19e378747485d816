//! 配置变更事件定义

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 配置变更事件
///
/// 由后台重载路径发出。后台重载没有同步的调用方，成功与失败都通过事件报告。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigChangeEvent {
    /// 事件类型
    pub event_type: ConfigChangeEventType,
    /// 事件来源（提供者名称）
    pub source: String,
    /// 附加说明，失败时为错误信息
    pub message: Option<String>,
    /// 事件时间
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// 额外元数据
    pub metadata: HashMap<String, String>,
}

impl ConfigChangeEvent {
    /// 创建配置重载事件
    pub fn reloaded(source: impl Into<String>) -> Self {
        Self {
            event_type: ConfigChangeEventType::Reloaded,
            source: source.into(),
            message: None,
            timestamp: chrono::Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// 创建配置重载失败事件
    pub fn reload_failed(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event_type: ConfigChangeEventType::ReloadFailed,
            source: source.into(),
            message: Some(message.into()),
            timestamp: chrono::Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// 添加元数据
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// 配置变更事件类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConfigChangeEventType {
    /// 配置已重载
    Reloaded,
    /// 配置重载失败，旧数据保留
    ReloadFailed,
}

/// 配置事件监听器 trait
pub trait ConfigEventListener: Send + Sync {
    /// 处理配置变更事件
    fn on_config_changed(&self, event: &ConfigChangeEvent);

    /// 获取监听器名称
    fn name(&self) -> &str;

    /// 是否启用
    fn is_enabled(&self) -> bool {
        true
    }

    /// 是否关心指定类型的事件
    fn is_interested(&self, _event_type: ConfigChangeEventType) -> bool {
        true
    }
}
