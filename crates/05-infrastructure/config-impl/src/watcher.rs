//! 配置文件监控器实现
//!
//! 基于 `notify` 监控文件所在目录（非递归），按文件的绝对路径把事件路由到对应的变更令牌。
//! 每次触发后令牌即从登记表中移除，下一次 [`FileWatcher::watch`] 会签发新令牌。
//! 被监控的目录被删除时，目录下所有令牌都会触发，下一次 `watch` 重新建立监控。

use config_abstractions::FileWatcher;
use config_common::{CancellationChangeToken, ChangeToken, ConfigError};
use notify::{Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 文件监控方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchMode {
    /// 操作系统原生通知
    #[default]
    Native,
    /// 按固定间隔轮询，并比较文件内容
    Polling(Duration),
}

/// 令牌登记表与已监控目录
#[derive(Default)]
struct WatchRegistry {
    tokens: HashMap<PathBuf, Arc<CancellationChangeToken>>,
    dirs: HashSet<PathBuf>,
}

type SharedRegistry = Arc<Mutex<WatchRegistry>>;

/// 基于 notify 的文件监控器
pub struct NotifyFileWatcher {
    mode: WatchMode,
    registry: SharedRegistry,
    watcher: Mutex<Option<Box<dyn Watcher + Send>>>,
}

impl NotifyFileWatcher {
    /// 创建文件监控器，底层监控在第一次 `watch` 时启动
    pub fn new(mode: WatchMode) -> Self {
        Self {
            mode,
            registry: Arc::new(Mutex::new(WatchRegistry::default())),
            watcher: Mutex::new(None),
        }
    }

    /// 监控方式
    pub fn mode(&self) -> WatchMode {
        self.mode
    }

    /// 当前监控的目录
    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        self.registry.lock().dirs.iter().cloned().collect()
    }

    fn create_watcher(&self) -> Result<Box<dyn Watcher + Send>, ConfigError> {
        let registry = self.registry.clone();
        let handler = move |result: notify::Result<Event>| match result {
            Ok(event) => dispatch_event(&registry, event),
            Err(e) => error!("文件监控错误: {:?}", e),
        };

        let watcher: Box<dyn Watcher + Send> = match self.mode {
            WatchMode::Native => Box::new(
                RecommendedWatcher::new(handler, notify::Config::default()).map_err(|e| {
                    ConfigError::WatchError {
                        message: format!("创建文件监控器失败: {e}"),
                    }
                })?,
            ),
            WatchMode::Polling(interval) => Box::new(
                PollWatcher::new(
                    handler,
                    notify::Config::default()
                        .with_poll_interval(interval)
                        .with_compare_contents(true),
                )
                .map_err(|e| ConfigError::WatchError {
                    message: format!("创建轮询文件监控器失败: {e}"),
                })?,
            ),
        };

        info!("启动配置文件监控: {:?}", self.mode);
        Ok(watcher)
    }

    fn ensure_directory_watched(&self, directory: &Path) -> Result<(), ConfigError> {
        if self.registry.lock().dirs.contains(directory) {
            return Ok(());
        }

        let mut guard = self.watcher.lock();
        if guard.is_none() {
            *guard = Some(self.create_watcher()?);
        }
        if let Some(watcher) = guard.as_mut() {
            // 目录被删除后重建时，旧的监控可能仍残留在 notify 中
            let _ = watcher.unwatch(directory);
            watcher
                .watch(directory, RecursiveMode::NonRecursive)
                .map_err(|e| ConfigError::WatchError {
                    message: format!("添加监控路径失败: {}: {e}", directory.display()),
                })?;
        }

        info!("添加监控路径: {}", directory.display());
        self.registry.lock().dirs.insert(directory.to_path_buf());
        Ok(())
    }
}

impl FileWatcher for NotifyFileWatcher {
    fn watch(&self, path: &Path) -> Result<Arc<dyn ChangeToken>, ConfigError> {
        let absolute = absolute_path(path)?;
        let file_name = absolute
            .file_name()
            .map(|name| name.to_os_string())
            .ok_or_else(|| ConfigError::WatchError {
                message: format!("路径没有文件名: {}", absolute.display()),
            })?;
        let parent = absolute.parent().ok_or_else(|| ConfigError::WatchError {
            message: format!("路径没有父目录: {}", absolute.display()),
        })?;
        if !parent.is_dir() {
            return Err(ConfigError::WatchError {
                message: format!("监控目录不存在: {}", parent.display()),
            });
        }
        // 事件路径以实际监控的目录为前缀，统一使用规范路径
        let directory = std::fs::canonicalize(parent).map_err(|e| ConfigError::WatchError {
            message: format!("无法解析监控目录 {}: {e}", parent.display()),
        })?;

        self.ensure_directory_watched(&directory)?;

        let token = self
            .registry
            .lock()
            .tokens
            .entry(directory.join(file_name))
            .or_insert_with(|| Arc::new(CancellationChangeToken::new()))
            .clone();
        Ok(token)
    }
}

impl Default for NotifyFileWatcher {
    fn default() -> Self {
        Self::new(WatchMode::Native)
    }
}

impl std::fmt::Debug for NotifyFileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("NotifyFileWatcher")
            .field("mode", &self.mode)
            .field("watched_dirs", &registry.dirs)
            .field("pending_tokens", &registry.tokens.len())
            .finish()
    }
}

fn dispatch_event(registry: &SharedRegistry, event: Event) {
    if matches!(event.kind, EventKind::Access(_)) {
        return;
    }
    debug!("文件系统事件: {:?}", event);

    let fired: Vec<Arc<CancellationChangeToken>> = {
        let mut registry = registry.lock();
        if event.paths.is_empty() {
            registry.tokens.drain().map(|(_, token)| token).collect()
        } else {
            let mut fired = Vec::new();
            for path in &event.paths {
                if matches!(event.kind, EventKind::Remove(_)) && registry.dirs.remove(path) {
                    warn!("监控目录已被删除: {}", path.display());
                    let orphaned: Vec<PathBuf> = registry
                        .tokens
                        .keys()
                        .filter(|file| file.parent() == Some(path.as_path()))
                        .cloned()
                        .collect();
                    for file in orphaned {
                        fired.extend(registry.tokens.remove(&file));
                    }
                }
                fired.extend(registry.tokens.remove(path));
            }
            fired
        }
    };

    // 在锁外触发，回调可能立即重新调用 watch
    for token in fired {
        token.fire();
    }
}

fn absolute_path(path: &Path) -> Result<PathBuf, ConfigError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let current_dir = std::env::current_dir().map_err(|e| ConfigError::WatchError {
        message: format!("无法获取当前目录: {e}"),
    })?;
    Ok(current_dir.join(path))
}

/// 创建监控器，失败时记录警告并返回 `None`
pub(crate) fn try_watch(
    watcher: &dyn FileWatcher,
    path: &Path,
) -> Option<Arc<dyn ChangeToken>> {
    match watcher.watch(path) {
        Ok(token) => Some(token),
        Err(e) => {
            warn!("无法监控配置文件 {}: {}", path.display(), e);
            None
        }
    }
}

/// 经过 `delay` 后自动触发的令牌，用于监控失败后的重试
pub(crate) fn delayed_token(delay: Duration) -> Arc<dyn ChangeToken> {
    let token = Arc::new(CancellationChangeToken::new());
    let timer = token.clone();
    let spawned = std::thread::Builder::new()
        .name("config-watch-retry".to_string())
        .spawn(move || {
            std::thread::sleep(delay);
            timer.fire();
        });
    if let Err(e) = spawned {
        error!("无法启动监控重试计时线程: {}", e);
    }
    token
}
