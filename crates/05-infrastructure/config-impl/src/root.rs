//! 组合配置
//!
//! [`CompositeConfiguration`] 按注册顺序持有提供者，不缓存合并结果：
//! 每次读取都从最后注册的提供者向前查找，第一个找到的值胜出。

use crate::binder;
use crate::section::Section;
use config_abstractions::{
    Configuration, ConfigurationProvider, ConfigurationRoot, ConfigurationSection,
};
use config_common::{
    fold_key, on_change, ChangeSubscription, ChangeToken, ChangeTokenSource, ConfigError,
    ConfigurationPath,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{error, info};

struct CompositeInner {
    providers: Vec<Arc<dyn ConfigurationProvider>>,
    reload_tokens: ChangeTokenSource,
    subscriptions: Mutex<Vec<ChangeSubscription>>,
}

/// 组合配置
///
/// 克隆开销很小，所有克隆共享同一组提供者和重载令牌。
#[derive(Clone)]
pub struct CompositeConfiguration {
    inner: Arc<CompositeInner>,
}

impl CompositeConfiguration {
    /// 由已加载的提供者创建组合配置，并订阅每个提供者的重载令牌
    pub fn new(providers: Vec<Arc<dyn ConfigurationProvider>>) -> Self {
        let inner = Arc::new(CompositeInner {
            providers,
            reload_tokens: ChangeTokenSource::new(),
            subscriptions: Mutex::new(Vec::new()),
        });

        let subscriptions = inner
            .providers
            .iter()
            .map(|provider| {
                let producer_provider = provider.clone();
                let weak = Arc::downgrade(&inner);
                on_change(
                    move || producer_provider.get_reload_token(),
                    move || {
                        if let Some(inner) = weak.upgrade() {
                            inner.reload_tokens.raise();
                        }
                    },
                )
            })
            .collect();
        *inner.subscriptions.lock() = subscriptions;

        Self { inner }
    }

    /// 根视图
    pub fn root_section(&self) -> Section {
        Section::new(self.clone(), String::new())
    }

    /// 把整个配置绑定为类型化对象
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        binder::bind(&self.root_section())
    }

    /// 指定路径下的直接子段名，忽略大小写去重，保留最先出现的写法
    pub(crate) fn child_keys(&self, parent_path: Option<&str>) -> Vec<String> {
        let folded = self
            .inner
            .providers
            .iter()
            .fold(Vec::new(), |keys, provider| {
                provider.get_child_keys(keys, parent_path)
            });

        let mut seen = HashSet::new();
        folded
            .into_iter()
            .filter(|key| seen.insert(fold_key(key)))
            .collect()
    }

    pub(crate) fn sections_under(&self, parent_path: Option<&str>) -> Vec<Section> {
        self.child_keys(parent_path)
            .into_iter()
            .map(|key| match parent_path {
                Some(parent) => {
                    Section::new(self.clone(), ConfigurationPath::combine([parent, key.as_str()]))
                }
                None => Section::new(self.clone(), key),
            })
            .collect()
    }

    /// 找出提供某个键当前值的提供者
    pub fn value_source(&self, key: &str) -> Option<(String, Arc<dyn ConfigurationProvider>)> {
        self.inner
            .providers
            .iter()
            .rev()
            .find_map(|provider| provider.try_get(key).map(|value| (value, provider.clone())))
    }

    /// 渲染合并后的配置树，并标注每个值来自哪个提供者
    pub fn debug_view(&self) -> String {
        let mut output = String::new();
        self.render_children(None, 0, &mut output);
        output
    }

    fn render_children(&self, parent_path: Option<&str>, depth: usize, output: &mut String) {
        for section in self.sections_under(parent_path) {
            let indent = "  ".repeat(depth);
            match self.value_source(section.path()) {
                Some((value, provider)) => {
                    let _ = writeln!(
                        output,
                        "{indent}{}={} ({})",
                        section.key(),
                        value,
                        provider.name()
                    );
                }
                None => {
                    let _ = writeln!(output, "{indent}{}:", section.key());
                }
            }
            self.render_children(Some(section.path()), depth + 1, output);
        }
    }
}

impl Configuration for CompositeConfiguration {
    type Section = Section;

    fn get(&self, key: &str) -> Option<String> {
        self.inner
            .providers
            .iter()
            .rev()
            .find_map(|provider| provider.try_get(key))
    }

    fn set(&self, key: &str, value: &str) {
        for provider in &self.inner.providers {
            provider.set(key, value);
        }
    }

    fn get_section(&self, key: &str) -> Section {
        Section::new(self.clone(), key.to_string())
    }

    fn get_children(&self) -> Vec<Section> {
        self.sections_under(None)
    }

    fn get_reload_token(&self) -> Arc<dyn ChangeToken> {
        self.inner.reload_tokens.token()
    }
}

impl ConfigurationRoot for CompositeConfiguration {
    fn reload(&self) -> Result<(), ConfigError> {
        let mut first_error = None;
        for provider in &self.inner.providers {
            if let Err(e) = provider.load() {
                error!("配置提供者重载失败: {}: {}", provider.name(), e);
                first_error.get_or_insert(e);
            }
        }

        info!("配置已重载，共 {} 个提供者", self.inner.providers.len());
        self.inner.reload_tokens.raise();

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn providers(&self) -> &[Arc<dyn ConfigurationProvider>] {
        &self.inner.providers
    }
}

impl std::fmt::Debug for CompositeConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeConfiguration")
            .field(
                "providers",
                &self
                    .inner
                    .providers
                    .iter()
                    .map(|provider| provider.name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
