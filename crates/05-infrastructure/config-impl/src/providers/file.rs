//! 文件配置提供者
//!
//! 文件内容由 [`FileParser`] 展开为扁平键值对。开启 `reload_on_change` 后，
//! 提供者订阅文件监控令牌，并把每次触发转交给专属的后台线程：
//! 线程等待文件在 `reload_delay` 内不再变化后重新加载，成功时触发新的重载令牌，
//! 失败时保留旧数据并通过事件通道报告。
//!
//! 监控建立失败时，提供者按 `watch_retry_interval` 定时重试；
//! 恢复后补发一次重载，以覆盖失败期间发生的修改。

use super::parsers::{parser_for, FileParser};
use crate::event_handler::ConfigEventHandler;
use crate::store::FlatKeyStore;
use crate::watcher::{delayed_token, try_watch, NotifyFileWatcher, WatchMode};
use config_abstractions::{
    ConfigChangeEvent, ConfigurationProvider, ConfigurationSource, FileFormat, FileWatcher,
};
use config_common::{
    on_change, ChangeSubscription, ChangeToken, ChangeTokenSource, ConfigError,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 默认的重载防抖延迟
pub const DEFAULT_RELOAD_DELAY: Duration = Duration::from_millis(250);

/// 默认的监控重试间隔
pub const DEFAULT_WATCH_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// 文件配置源
#[derive(Clone)]
pub struct FileConfigurationSource {
    /// 文件路径
    pub path: PathBuf,
    /// 显式指定的文件格式，缺省时按扩展名推断
    pub format: Option<FileFormat>,
    /// 自定义解析器，优先于 `format`
    pub parser: Option<Arc<dyn FileParser>>,
    /// 文件不存在时是否视为空配置
    pub optional: bool,
    /// 文件变化时是否自动重载
    pub reload_on_change: bool,
    /// 重载前等待文件静默的时间
    pub reload_delay: Duration,
    /// 监控建立失败后的重试间隔
    pub watch_retry_interval: Duration,
    /// 自定义文件监控器
    pub watcher: Option<Arc<dyn FileWatcher>>,
    /// 默认监控器的监控方式
    pub watch_mode: WatchMode,
    /// 重载事件处理器
    pub event_handler: Option<Arc<ConfigEventHandler>>,
}

impl FileConfigurationSource {
    /// 创建文件配置源
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: None,
            parser: None,
            optional: false,
            reload_on_change: false,
            reload_delay: DEFAULT_RELOAD_DELAY,
            watch_retry_interval: DEFAULT_WATCH_RETRY_INTERVAL,
            watcher: None,
            watch_mode: WatchMode::default(),
            event_handler: None,
        }
    }

    /// 指定文件格式
    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// 指定解析器
    pub fn with_parser(mut self, parser: Arc<dyn FileParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// 设置文件是否可选
    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// 设置是否在文件变化时重载
    pub fn reload_on_change(mut self, reload_on_change: bool) -> Self {
        self.reload_on_change = reload_on_change;
        self
    }

    /// 设置防抖延迟
    pub fn with_reload_delay(mut self, delay: Duration) -> Self {
        self.reload_delay = delay;
        self
    }

    /// 设置监控失败后的重试间隔
    pub fn with_watch_retry_interval(mut self, interval: Duration) -> Self {
        self.watch_retry_interval = interval;
        self
    }

    /// 使用自定义文件监控器
    pub fn with_watcher(mut self, watcher: Arc<dyn FileWatcher>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    /// 设置默认监控器的监控方式
    pub fn with_watch_mode(mut self, mode: WatchMode) -> Self {
        self.watch_mode = mode;
        self
    }

    /// 设置重载事件处理器
    pub fn with_event_handler(mut self, handler: Arc<ConfigEventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    fn resolve_parser(&self) -> Result<Arc<dyn FileParser>, ConfigError> {
        if let Some(parser) = &self.parser {
            return Ok(parser.clone());
        }
        self.format
            .or_else(|| FileFormat::from_path(&self.path))
            .map(parser_for)
            .ok_or_else(|| {
                ConfigError::parse_error(
                    self.path.display().to_string(),
                    "无法根据扩展名识别配置文件格式",
                )
            })
    }
}

impl std::fmt::Debug for FileConfigurationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileConfigurationSource")
            .field("path", &self.path)
            .field("format", &self.format)
            .field("optional", &self.optional)
            .field("reload_on_change", &self.reload_on_change)
            .field("reload_delay", &self.reload_delay)
            .field("watch_retry_interval", &self.watch_retry_interval)
            .field("watch_mode", &self.watch_mode)
            .finish()
    }
}

impl FileConfigurationSource {
    /// 创建具体类型的文件提供者
    pub fn build_provider(&self) -> Result<Arc<FileConfigurationProvider>, ConfigError> {
        let provider = Arc::new(FileConfigurationProvider {
            path: self.path.clone(),
            parser: self.resolve_parser()?,
            optional: self.optional,
            store: FlatKeyStore::new(),
            load_lock: Mutex::new(()),
            reload_tokens: ChangeTokenSource::new(),
            event_handler: self.event_handler.clone(),
            subscription: Mutex::new(None),
            watch_state: Arc::new(Mutex::new(WatchState::default())),
        });

        if self.reload_on_change {
            let watcher = self
                .watcher
                .clone()
                .unwrap_or_else(|| Arc::new(NotifyFileWatcher::new(self.watch_mode)));
            provider.start_watching(watcher, self.reload_delay, self.watch_retry_interval)?;
        }

        Ok(provider)
    }
}

impl ConfigurationSource for FileConfigurationSource {
    fn build(&self) -> Result<Arc<dyn ConfigurationProvider>, ConfigError> {
        let provider: Arc<dyn ConfigurationProvider> = self.build_provider()?;
        Ok(provider)
    }
}

/// 当前与上一个监控令牌是否为重试计时令牌
#[derive(Debug, Default)]
struct WatchState {
    retrying: bool,
    previous_retrying: bool,
}

/// 文件配置提供者
pub struct FileConfigurationProvider {
    path: PathBuf,
    parser: Arc<dyn FileParser>,
    optional: bool,
    store: FlatKeyStore,
    load_lock: Mutex<()>,
    reload_tokens: ChangeTokenSource,
    event_handler: Option<Arc<ConfigEventHandler>>,
    subscription: Mutex<Option<ChangeSubscription>>,
    watch_state: Arc<Mutex<WatchState>>,
}

impl FileConfigurationProvider {
    /// 文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 是否正在监控文件变化
    ///
    /// 监控建立失败、等待重试期间返回 `false`。
    pub fn is_watching(&self) -> bool {
        self.subscription.lock().is_some() && !self.watch_state.lock().retrying
    }

    fn source_name(&self) -> String {
        self.path.display().to_string()
    }

    /// 读取并解析文件，不修改存储
    fn read_entries(&self) -> Result<Vec<(String, String)>, ConfigError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if self.optional {
                    debug!("可选配置文件不存在: {}", self.path.display());
                    return Ok(Vec::new());
                }
                return Err(ConfigError::FileNotFound {
                    path: self.source_name(),
                });
            }
            Err(e) => {
                return Err(ConfigError::FileReadError {
                    path: self.source_name(),
                    source: e,
                })
            }
        };

        self.parser.parse(&content, &self.source_name())
    }

    fn start_watching(
        self: &Arc<Self>,
        watcher: Arc<dyn FileWatcher>,
        reload_delay: Duration,
        retry_interval: Duration,
    ) -> Result<(), ConfigError> {
        let (sender, receiver) = mpsc::channel::<()>();
        let weak = Arc::downgrade(self);

        std::thread::Builder::new()
            .name(format!("config-watch-{}", self.parser.name()))
            .spawn(move || watch_worker(weak, receiver, reload_delay))
            .map_err(|e| ConfigError::WatchError {
                message: format!("无法启动文件监控线程: {e}"),
            })?;

        let path = self.path.clone();
        let producer_state = self.watch_state.clone();
        let consumer_state = self.watch_state.clone();
        let subscription = on_change(
            move || -> Arc<dyn ChangeToken> {
                let (token, retrying) = match try_watch(watcher.as_ref(), &path) {
                    Some(token) => (token, false),
                    None => {
                        warn!("{:?} 后重试监控: {}", retry_interval, path.display());
                        (delayed_token(retry_interval), true)
                    }
                };
                let mut state = producer_state.lock();
                state.previous_retrying = state.retrying;
                state.retrying = retrying;
                token
            },
            move || {
                let state = consumer_state.lock();
                if state.previous_retrying && state.retrying {
                    return;
                }
                if state.previous_retrying {
                    info!("配置文件监控已恢复");
                }
                drop(state);
                // 工作线程退出后发送失败可以忽略
                let _ = sender.send(());
            },
        );

        info!("开始监控配置文件: {}", self.path.display());
        *self.subscription.lock() = Some(subscription);
        Ok(())
    }

    /// 由监控线程调用的重载
    fn reload_from_watch(&self) {
        match self.load() {
            Ok(()) => {
                info!("配置文件已重载: {}", self.path.display());
                self.reload_tokens.raise();
                self.publish(ConfigChangeEvent::reloaded(self.name()));
            }
            Err(e) => {
                error!("配置文件重载失败，保留旧配置: {}: {}", self.path.display(), e);
                self.publish(ConfigChangeEvent::reload_failed(self.name(), e.to_string()));
            }
        }
    }

    fn publish(&self, event: ConfigChangeEvent) {
        if let Some(handler) = &self.event_handler {
            handler.publish(event.with_metadata("path", self.source_name()));
        }
    }
}

impl ConfigurationProvider for FileConfigurationProvider {
    fn load(&self) -> Result<(), ConfigError> {
        let _guard = self.load_lock.lock();
        debug!("加载配置文件: {}", self.path.display());
        let entries = self.read_entries()?;
        debug!("配置文件加载完成: {} ({} 个键)", self.path.display(), entries.len());
        self.store.replace(entries);
        Ok(())
    }

    fn try_get(&self, key: &str) -> Option<String> {
        self.store.get(key)
    }

    fn set(&self, key: &str, value: &str) {
        let _guard = self.load_lock.lock();
        self.store.set(key, value);
    }

    fn get_child_keys(&self, earlier_keys: Vec<String>, parent_path: Option<&str>) -> Vec<String> {
        self.store.child_keys(earlier_keys, parent_path)
    }

    fn get_reload_token(&self) -> Arc<dyn ChangeToken> {
        self.reload_tokens.token()
    }

    fn name(&self) -> String {
        let format = self.parser.name();
        let mut chars = format.chars();
        let format = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        };
        format!(
            "{}ConfigurationProvider for '{}' ({})",
            format,
            self.path.display(),
            if self.optional { "Optional" } else { "Required" }
        )
    }
}

impl std::fmt::Debug for FileConfigurationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileConfigurationProvider")
            .field("path", &self.path)
            .field("parser", &self.parser.name())
            .field("optional", &self.optional)
            .field("keys", &self.store.len())
            .field("watching", &self.is_watching())
            .finish()
    }
}

/// 监控线程主循环
///
/// 收到通知后持续等待，直到 `reload_delay` 内不再有新的通知才重载一次。
fn watch_worker(
    provider: Weak<FileConfigurationProvider>,
    receiver: Receiver<()>,
    reload_delay: Duration,
) {
    while receiver.recv().is_ok() {
        loop {
            match receiver.recv_timeout(reload_delay) {
                Ok(()) => continue,
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }

        let Some(provider) = provider.upgrade() else {
            return;
        };
        provider.reload_from_watch();
    }
    debug!("配置文件监控线程退出");
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_abstractions::ConfigChangeEventType;
    use std::fs;
    use std::time::Instant;

    /// 手动触发的文件监控器
    #[derive(Default)]
    struct ManualFileWatcher {
        tokens: ChangeTokenSource,
    }

    impl ManualFileWatcher {
        fn trigger(&self) {
            self.tokens.raise();
        }
    }

    impl FileWatcher for ManualFileWatcher {
        fn watch(&self, _path: &Path) -> Result<Arc<dyn ChangeToken>, ConfigError> {
            Ok(self.tokens.token())
        }
    }

    /// 前若干次 `watch` 失败的文件监控器
    struct FlakyFileWatcher {
        failures_left: Mutex<usize>,
        tokens: ChangeTokenSource,
    }

    impl FlakyFileWatcher {
        fn failing(times: usize) -> Self {
            Self {
                failures_left: Mutex::new(times),
                tokens: ChangeTokenSource::new(),
            }
        }
    }

    impl FileWatcher for FlakyFileWatcher {
        fn watch(&self, path: &Path) -> Result<Arc<dyn ChangeToken>, ConfigError> {
            let mut failures_left = self.failures_left.lock();
            if *failures_left > 0 {
                *failures_left -= 1;
                return Err(ConfigError::WatchError {
                    message: format!("监控目录暂不可用: {}", path.display()),
                });
            }
            Ok(self.tokens.token())
        }
    }

    fn next_event(
        events: &mut tokio::sync::broadcast::Receiver<ConfigChangeEvent>,
    ) -> ConfigChangeEvent {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match events.try_recv() {
                Ok(event) => return event,
                Err(_) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(e) => panic!("no reload event: {e:?}"),
            }
        }
    }

    fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        condition()
    }

    #[test]
    fn test_missing_required_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileConfigurationSource::new(dir.path().join("missing.json"))
            .build()
            .unwrap();
        let error = provider.load().unwrap_err();
        assert!(error.is_not_found());
    }

    #[test]
    fn test_missing_optional_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileConfigurationSource::new(dir.path().join("missing.yaml"))
            .optional(true)
            .build()
            .unwrap();
        provider.load().unwrap();
        assert!(provider.get_child_keys(Vec::new(), None).is_empty());
        assert!(provider.name().contains("Optional"));
    }

    #[test]
    fn test_unknown_extension_requires_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.conf");
        fs::write(&path, "[App]\nName = demo\n").unwrap();

        assert!(FileConfigurationSource::new(&path).build().is_err());

        let provider = FileConfigurationSource::new(&path)
            .with_format(FileFormat::Ini)
            .build()
            .unwrap();
        provider.load().unwrap();
        assert_eq!(provider.try_get("app:name").as_deref(), Some("demo"));
    }

    #[test]
    fn test_load_twice_is_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.json");
        fs::write(&path, r#"{"A": {"B": "v"}, "List": [1, 2]}"#).unwrap();

        let provider = FileConfigurationSource::new(&path).build().unwrap();
        provider.load().unwrap();
        let first = provider.get_child_keys(Vec::new(), None);
        provider.load().unwrap();
        assert_eq!(first, provider.get_child_keys(Vec::new(), None));
        assert_eq!(provider.try_get("A:B").as_deref(), Some("v"));
        assert_eq!(provider.try_get("List:1").as_deref(), Some("2"));
    }

    #[test]
    fn test_failed_load_keeps_previous_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.json");
        fs::write(&path, r#"{"Key": "old"}"#).unwrap();

        let provider = FileConfigurationSource::new(&path).build().unwrap();
        provider.load().unwrap();

        fs::write(&path, r#"{"Key": "#).unwrap();
        assert!(matches!(provider.load(), Err(ConfigError::ParseError { .. })));
        assert_eq!(provider.try_get("Key").as_deref(), Some("old"));
    }

    #[test]
    fn test_manual_watcher_triggers_debounced_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.json");
        fs::write(&path, r#"{"Value": "1"}"#).unwrap();

        let watcher = Arc::new(ManualFileWatcher::default());
        let handler = Arc::new(ConfigEventHandler::new());
        let mut events = handler.subscribe();

        let provider = FileConfigurationSource::new(&path)
            .reload_on_change(true)
            .with_reload_delay(Duration::from_millis(30))
            .with_watcher(watcher.clone())
            .with_event_handler(handler.clone())
            .build()
            .unwrap();
        provider.load().unwrap();
        let token = provider.get_reload_token();

        fs::write(&path, r#"{"Value": "2"}"#).unwrap();
        watcher.trigger();
        watcher.trigger();
        watcher.trigger();

        assert!(wait_until(Duration::from_secs(5), || token.has_changed()));
        assert_eq!(provider.try_get("Value").as_deref(), Some("2"));
        assert!(!provider.get_reload_token().has_changed());

        let event = next_event(&mut events);
        assert_eq!(event.event_type, ConfigChangeEventType::Reloaded);
        assert_eq!(event.metadata.get("path"), Some(&path.display().to_string()));
    }

    #[test]
    fn test_watch_reload_failure_keeps_old_data_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.yaml");
        fs::write(&path, "Value: good\n").unwrap();

        let watcher = Arc::new(ManualFileWatcher::default());
        let handler = Arc::new(ConfigEventHandler::new());
        let mut events = handler.subscribe();

        let provider = FileConfigurationSource::new(&path)
            .reload_on_change(true)
            .with_reload_delay(Duration::from_millis(10))
            .with_watcher(watcher.clone())
            .with_event_handler(handler)
            .build()
            .unwrap();
        provider.load().unwrap();
        let token = provider.get_reload_token();

        fs::write(&path, "Value: [unclosed\n").unwrap();
        watcher.trigger();

        let event = next_event(&mut events);
        assert_eq!(event.event_type, ConfigChangeEventType::ReloadFailed);
        assert!(event.message.is_some());
        assert!(!token.has_changed());
        assert_eq!(provider.try_get("Value").as_deref(), Some("good"));
    }

    #[test]
    fn test_failed_watch_is_retried_and_catches_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.toml");
        fs::write(&path, "Value = \"1\"\n").unwrap();

        let watcher = Arc::new(FlakyFileWatcher::failing(3));
        let provider = FileConfigurationSource::new(&path)
            .reload_on_change(true)
            .with_reload_delay(Duration::from_millis(10))
            .with_watch_retry_interval(Duration::from_millis(50))
            .with_watcher(watcher.clone())
            .build_provider()
            .unwrap();
        provider.load().unwrap();
        assert!(!provider.is_watching());

        fs::write(&path, "Value = \"2\"\n").unwrap();
        assert!(wait_until(Duration::from_secs(5), || provider.is_watching()));
        assert!(wait_until(Duration::from_secs(5), || {
            provider.try_get("Value").as_deref() == Some("2")
        }));
        assert_eq!(*watcher.failures_left.lock(), 0);

        let token = provider.get_reload_token();
        fs::write(&path, "Value = \"3\"\n").unwrap();
        watcher.tokens.raise();
        assert!(wait_until(Duration::from_secs(5), || token.has_changed()));
        assert_eq!(provider.try_get("Value").as_deref(), Some("3"));
    }
}
