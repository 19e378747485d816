//! 配置变更事件处理器实现
//!
//! 后台重载没有同步的调用方，成功或失败都经由这里报告：
//! 同步分发给已注册的监听器，同时广播给异步订阅者。

use config_abstractions::events::{ConfigChangeEvent, ConfigChangeEventType, ConfigEventListener};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// 广播通道容量
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// 配置事件处理器
///
/// 负责把配置变更事件分发到各个监听器和广播订阅者
pub struct ConfigEventHandler {
    /// 事件监听器映射
    listeners: RwLock<HashMap<String, Arc<dyn ConfigEventListener>>>,
    /// 广播发送端
    event_sender: broadcast::Sender<ConfigChangeEvent>,
}

impl ConfigEventHandler {
    /// 创建新的配置事件处理器
    pub fn new() -> Self {
        let (event_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            listeners: RwLock::new(HashMap::new()),
            event_sender,
        }
    }

    /// 注册事件监听器，同名监听器会被替换
    pub fn register_listener(&self, listener: Arc<dyn ConfigEventListener>) {
        info!("注册配置事件监听器: {}", listener.name());
        self.listeners
            .write()
            .insert(listener.name().to_string(), listener);
    }

    /// 移除事件监听器，返回该监听器此前是否已注册
    pub fn unregister_listener(&self, listener_name: &str) -> bool {
        let removed = self.listeners.write().remove(listener_name).is_some();
        if removed {
            info!("移除配置事件监听器: {}", listener_name);
        } else {
            debug!("配置事件监听器未注册: {}", listener_name);
        }
        removed
    }

    /// 订阅广播事件
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChangeEvent> {
        self.event_sender.subscribe()
    }

    /// 发布配置变更事件
    pub fn publish(&self, event: ConfigChangeEvent) {
        debug!("发布配置变更事件: {:?} from {}", event.event_type, event.source);

        let listeners: Vec<Arc<dyn ConfigEventListener>> =
            self.listeners.read().values().cloned().collect();
        for listener in listeners {
            if !listener.is_enabled() || !listener.is_interested(event.event_type) {
                continue;
            }
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.on_config_changed(&event)));
            if outcome.is_err() {
                error!("配置事件监听器 {} 处理事件时发生 panic", listener.name());
            }
        }

        // 没有订阅者时发送失败是正常情况
        let _ = self.event_sender.send(event);
    }

    /// 获取监听器数量
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// 获取所有监听器名称
    pub fn listener_names(&self) -> Vec<String> {
        self.listeners.read().keys().cloned().collect()
    }
}

impl Default for ConfigEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConfigEventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigEventHandler")
            .field("listeners", &self.listener_names())
            .field("subscribers", &self.event_sender.receiver_count())
            .finish()
    }
}

/// 日志记录事件监听器
///
/// 将所有配置变更事件记录到日志中
pub struct LoggingConfigEventListener {
    name: String,
    enabled: bool,
}

impl LoggingConfigEventListener {
    /// 创建新的日志记录监听器
    pub fn new() -> Self {
        Self {
            name: "LoggingConfigEventListener".to_string(),
            enabled: true,
        }
    }

    /// 设置是否启用
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

impl Default for LoggingConfigEventListener {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigEventListener for LoggingConfigEventListener {
    fn on_config_changed(&self, event: &ConfigChangeEvent) {
        match event.event_type {
            ConfigChangeEventType::Reloaded => {
                info!("配置重载: {} at {}", event.source, event.timestamp);
            }
            ConfigChangeEventType::ReloadFailed => {
                warn!(
                    "配置重载失败，保留旧配置: {} at {}: {}",
                    event.source,
                    event.timestamp,
                    event.message.as_deref().unwrap_or_default()
                );
            }
        }

        if !event.metadata.is_empty() {
            debug!("事件元数据: {:?}", event.metadata);
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// 重载统计监听器
///
/// 统计重载成功与失败的次数
pub struct ReloadStatisticsListener {
    name: String,
    reload_count: AtomicU64,
    failure_count: AtomicU64,
}

impl ReloadStatisticsListener {
    /// 创建新的统计监听器
    pub fn new() -> Self {
        Self {
            name: "ReloadStatisticsListener".to_string(),
            reload_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
        }
    }

    /// 获取成功重载次数
    pub fn reload_count(&self) -> u64 {
        self.reload_count.load(Ordering::Relaxed)
    }

    /// 获取失败次数
    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// 重置计数器
    pub fn reset_counters(&self) {
        self.reload_count.store(0, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);
    }
}

impl Default for ReloadStatisticsListener {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigEventListener for ReloadStatisticsListener {
    fn on_config_changed(&self, event: &ConfigChangeEvent) {
        match event.event_type {
            ConfigChangeEventType::Reloaded => {
                self.reload_count.fetch_add(1, Ordering::Relaxed);
            }
            ConfigChangeEventType::ReloadFailed => {
                self.failure_count.fetch_add(1, Ordering::Relaxed);
                error!(
                    "配置重载失败统计更新: {} (总失败数: {})",
                    event.source,
                    self.failure_count()
                );
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
