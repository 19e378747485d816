//! 类型化选项
//!
//! [`OptionsFactory`] 记录每个命名实例对应的配置节以及后置配置回调，并负责创建实例。
//! 在工厂之上提供三种使用方式：
//!
//! - [`Options`] - 创建时绑定一次的快照
//! - [`OptionsMonitor`] - 始终反映最新配置，配置变化后在下一次访问时重新绑定
//! - [`OptionsSnapshot`] - 作用域内的快照，每个名称在作用域内只绑定一次

use crate::root::CompositeConfiguration;
use crate::section::Section;
use config_abstractions::{Configuration, ConfigurationSection};
use config_common::{
    on_change, ChangeSubscription, ChangeToken, CompositeChangeToken, ConfigError, Configurable,
    NeverChangeToken,
};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// 默认实例名称
pub const DEFAULT_NAME: &str = "";

type PostConfigure<T> = Arc<dyn Fn(&mut T) + Send + Sync>;
type ChangeListener<T> = Arc<dyn Fn(&T, &str) + Send + Sync>;

/// 选项工厂
pub struct OptionsFactory<T> {
    sections: HashMap<String, Section>,
    post_configures: Vec<(Option<String>, PostConfigure<T>)>,
}

impl<T> OptionsFactory<T>
where
    T: DeserializeOwned + Default + Send + Sync + 'static,
{
    /// 创建空工厂
    pub fn new() -> Self {
        Self {
            sections: HashMap::new(),
            post_configures: Vec::new(),
        }
    }

    /// 以类型的默认配置节路径绑定默认实例
    pub fn from_configurable(configuration: &CompositeConfiguration) -> Self
    where
        T: Configurable,
    {
        Self::new().bind(configuration.get_section(T::get_config_path()))
    }

    /// 绑定默认实例
    pub fn bind(self, section: Section) -> Self {
        self.bind_named(DEFAULT_NAME, section)
    }

    /// 绑定命名实例
    pub fn bind_named(mut self, name: impl Into<String>, section: Section) -> Self {
        let name = name.into();
        debug!(
            "注册选项 {} [{}] -> {}",
            std::any::type_name::<T>(),
            name,
            section.path()
        );
        self.sections.insert(name, section);
        self
    }

    /// 为默认实例添加后置配置
    pub fn post_configure(self, configure: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        self.post_configure_named(DEFAULT_NAME, configure)
    }

    /// 为命名实例添加后置配置
    pub fn post_configure_named(
        mut self,
        name: impl Into<String>,
        configure: impl Fn(&mut T) + Send + Sync + 'static,
    ) -> Self {
        self.post_configures
            .push((Some(name.into()), Arc::new(configure)));
        self
    }

    /// 为所有实例添加后置配置
    pub fn post_configure_all(mut self, configure: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        self.post_configures.push((None, Arc::new(configure)));
        self
    }

    /// 已注册的实例名称
    pub fn names(&self) -> Vec<String> {
        self.sections.keys().cloned().collect()
    }

    /// 创建实例
    ///
    /// 未注册或配置节不存在时从 `T::default()` 开始，随后按注册顺序执行后置配置。
    pub fn create(&self, name: &str) -> Result<T, ConfigError> {
        let mut value = match self.sections.get(name) {
            Some(section) if section.exists() => section.bind::<T>()?,
            _ => T::default(),
        };

        for (target, configure) in &self.post_configures {
            if target.as_deref().map_or(true, |target| target == name) {
                configure(&mut value);
            }
        }
        Ok(value)
    }

    /// 任一已注册配置节变化时触发的令牌
    pub fn change_token(&self) -> Arc<dyn ChangeToken> {
        let mut tokens: Vec<Arc<dyn ChangeToken>> = self
            .sections
            .values()
            .map(|section| section.get_reload_token())
            .collect();
        match tokens.len() {
            0 => Arc::new(NeverChangeToken),
            1 => tokens.remove(0),
            _ => Arc::new(CompositeChangeToken::new(tokens)),
        }
    }
}

impl<T> Default for OptionsFactory<T>
where
    T: DeserializeOwned + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// 创建时绑定一次的选项
pub struct Options<T> {
    value: Arc<T>,
}

impl<T> Options<T>
where
    T: DeserializeOwned + Default + Send + Sync + 'static,
{
    /// 创建默认实例的快照
    pub fn new(factory: &OptionsFactory<T>) -> Result<Self, ConfigError> {
        Ok(Self {
            value: Arc::new(factory.create(DEFAULT_NAME)?),
        })
    }

    /// 选项值
    pub fn value(&self) -> &T {
        &self.value
    }

    /// 共享的选项值
    pub fn shared(&self) -> Arc<T> {
        self.value.clone()
    }
}

struct MonitorInner<T> {
    factory: Arc<OptionsFactory<T>>,
    cache: DashMap<String, (Arc<T>, u64)>,
    epoch: AtomicU64,
    listeners: RwLock<Vec<(u64, ChangeListener<T>)>>,
    next_listener_id: AtomicU64,
}

impl<T> MonitorInner<T>
where
    T: DeserializeOwned + Default + Send + Sync + 'static,
{
    fn get(&self, name: &str) -> Result<Arc<T>, ConfigError> {
        let epoch = self.epoch.load(Ordering::Acquire);
        if let Some(entry) = self.cache.get(name) {
            if entry.1 == epoch {
                return Ok(entry.0.clone());
            }
        }

        let value = Arc::new(self.factory.create(name)?);
        self.cache
            .insert(name.to_string(), (value.clone(), epoch));
        Ok(value)
    }

    fn on_source_changed(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);

        let listeners: Vec<ChangeListener<T>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        if listeners.is_empty() {
            return;
        }

        for name in self.factory.names() {
            match self.get(&name) {
                Ok(value) => {
                    for listener in &listeners {
                        listener(&value, &name);
                    }
                }
                Err(e) => {
                    warn!(
                        "配置变化后重新绑定选项失败 {} [{}]: {}",
                        std::any::type_name::<T>(),
                        name,
                        e
                    );
                }
            }
        }
    }
}

/// 始终反映最新配置的选项
pub struct OptionsMonitor<T> {
    inner: Arc<MonitorInner<T>>,
    _subscription: ChangeSubscription,
}

impl<T> OptionsMonitor<T>
where
    T: DeserializeOwned + Default + Send + Sync + 'static,
{
    /// 创建选项监视器
    pub fn new(factory: OptionsFactory<T>) -> Self {
        let inner = Arc::new(MonitorInner {
            factory: Arc::new(factory),
            cache: DashMap::new(),
            epoch: AtomicU64::new(0),
            listeners: RwLock::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
        });

        let producer = Arc::downgrade(&inner);
        let consumer = Arc::downgrade(&inner);
        let subscription = on_change(
            move || match producer.upgrade() {
                Some(inner) => inner.factory.change_token(),
                None => Arc::new(NeverChangeToken),
            },
            move || {
                if let Some(inner) = consumer.upgrade() {
                    inner.on_source_changed();
                }
            },
        );

        Self {
            inner,
            _subscription: subscription,
        }
    }

    /// 默认实例的当前值
    pub fn current_value(&self) -> Result<Arc<T>, ConfigError> {
        self.inner.get(DEFAULT_NAME)
    }

    /// 命名实例的当前值
    pub fn get(&self, name: &str) -> Result<Arc<T>, ConfigError> {
        self.inner.get(name)
    }

    /// 注册变化监听器，配置变化后以新值和实例名称调用
    pub fn on_change(
        &self,
        listener: impl Fn(&T, &str) + Send + Sync + 'static,
    ) -> OptionsChangeRegistration<T> {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.write().push((id, Arc::new(listener)));
        OptionsChangeRegistration {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// 基于同一个工厂创建作用域快照
    pub fn snapshot(&self) -> OptionsSnapshot<T> {
        OptionsSnapshot::from_shared(self.inner.factory.clone())
    }
}

/// 选项变化监听器的注册句柄
///
/// 丢弃句柄不会移除监听器，需要显式调用 [`OptionsChangeRegistration::dispose`]。
pub struct OptionsChangeRegistration<T> {
    id: u64,
    inner: Weak<MonitorInner<T>>,
}

impl<T> OptionsChangeRegistration<T> {
    /// 移除监听器
    pub fn dispose(self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.listeners.write().retain(|(id, _)| *id != self.id);
        }
    }
}

/// 作用域内的选项快照
pub struct OptionsSnapshot<T> {
    factory: Arc<OptionsFactory<T>>,
    cache: Mutex<HashMap<String, Arc<T>>>,
}

impl<T> OptionsSnapshot<T>
where
    T: DeserializeOwned + Default + Send + Sync + 'static,
{
    /// 创建作用域快照
    pub fn new(factory: OptionsFactory<T>) -> Self {
        Self::from_shared(Arc::new(factory))
    }

    fn from_shared(factory: Arc<OptionsFactory<T>>) -> Self {
        Self {
            factory,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// 默认实例
    pub fn value(&self) -> Result<Arc<T>, ConfigError> {
        self.get(DEFAULT_NAME)
    }

    /// 命名实例，作用域内首次访问时绑定
    pub fn get(&self, name: &str) -> Result<Arc<T>, ConfigError> {
        let mut cache = self.cache.lock();
        if let Some(value) = cache.get(name) {
            return Ok(value.clone());
        }
        let value = Arc::new(self.factory.create(name)?);
        cache.insert(name.to_string(), value.clone());
        Ok(value)
    }
}
