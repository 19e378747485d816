//! 变更令牌
//!
//! 变更令牌代表“自令牌签发以来配置可能已经变化”。每个令牌最多触发一次，
//! 注册在令牌上的回调也只会执行一次；想要继续观察后续变化，必须重新获取新的令牌。
//!
//! - [`CancellationChangeToken`] - 可以手动触发的令牌
//! - [`NeverChangeToken`] - 永不触发的令牌，用于没有可变数据源的提供者
//! - [`CompositeChangeToken`] - 任一子令牌触发即触发
//! - [`ChangeTokenSource`] - 持有当前纪元的令牌，触发时换入新令牌
//! - [`on_change`] - 每次触发后自动重新订阅的持续订阅

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::error;

/// 变更回调
pub type ChangeCallback = Box<dyn FnOnce() + Send + 'static>;

/// 变更令牌 trait
pub trait ChangeToken: Send + Sync {
    /// 令牌是否已经触发
    fn has_changed(&self) -> bool;

    /// 令牌是否会主动调用回调
    fn active_change_callbacks(&self) -> bool {
        true
    }

    /// 注册一次性回调
    ///
    /// 令牌已经触发时回调会被立即执行。
    fn register_callback(&self, callback: ChangeCallback) -> CallbackRegistration;
}

/// 回调注册句柄
///
/// 丢弃句柄不会注销回调，需要显式调用 [`CallbackRegistration::dispose`]。
#[must_use = "丢弃注册句柄不会注销回调"]
pub struct CallbackRegistration {
    unregister: Option<Box<dyn FnOnce() + Send>>,
}

impl CallbackRegistration {
    /// 不对应任何回调的空句柄
    pub fn empty() -> Self {
        Self { unregister: None }
    }

    /// 由注销函数创建句柄
    pub fn new(unregister: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unregister: Some(Box::new(unregister)),
        }
    }

    /// 注销回调；回调尚未执行时将不再执行
    pub fn dispose(mut self) {
        if let Some(unregister) = self.unregister.take() {
            unregister();
        }
    }
}

impl std::fmt::Debug for CallbackRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistration")
            .field("active", &self.unregister.is_some())
            .finish()
    }
}

struct TokenState {
    fired: bool,
    next_id: u64,
    callbacks: Vec<(u64, ChangeCallback)>,
}

/// 可手动触发的变更令牌
pub struct CancellationChangeToken {
    state: Arc<Mutex<TokenState>>,
}

impl CancellationChangeToken {
    /// 创建尚未触发的令牌
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TokenState {
                fired: false,
                next_id: 0,
                callbacks: Vec::new(),
            })),
        }
    }

    /// 触发令牌，执行所有已注册的回调
    ///
    /// 重复触发不会产生任何效果。
    pub fn fire(&self) {
        let callbacks = {
            let mut state = self.state.lock();
            if state.fired {
                return;
            }
            state.fired = true;
            std::mem::take(&mut state.callbacks)
        };

        for (_, callback) in callbacks {
            invoke_callback(callback);
        }
    }

    /// 当前挂起的回调数量
    pub fn pending_callbacks(&self) -> usize {
        self.state.lock().callbacks.len()
    }
}

impl Default for CancellationChangeToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationChangeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CancellationChangeToken")
            .field("fired", &state.fired)
            .field("callbacks", &state.callbacks.len())
            .finish()
    }
}

impl ChangeToken for CancellationChangeToken {
    fn has_changed(&self) -> bool {
        self.state.lock().fired
    }

    fn register_callback(&self, callback: ChangeCallback) -> CallbackRegistration {
        let mut state = self.state.lock();
        if state.fired {
            drop(state);
            invoke_callback(callback);
            return CallbackRegistration::empty();
        }

        let id = state.next_id;
        state.next_id += 1;
        state.callbacks.push((id, callback));

        let weak: Weak<Mutex<TokenState>> = Arc::downgrade(&self.state);
        CallbackRegistration::new(move || {
            if let Some(state) = weak.upgrade() {
                state.lock().callbacks.retain(|(existing, _)| *existing != id);
            }
        })
    }
}

fn invoke_callback(callback: ChangeCallback) {
    if catch_unwind(AssertUnwindSafe(callback)).is_err() {
        error!("变更回调执行时发生 panic");
    }
}

/// 永不触发的变更令牌
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverChangeToken;

impl ChangeToken for NeverChangeToken {
    fn has_changed(&self) -> bool {
        false
    }

    fn active_change_callbacks(&self) -> bool {
        false
    }

    fn register_callback(&self, _callback: ChangeCallback) -> CallbackRegistration {
        CallbackRegistration::empty()
    }
}

/// 组合变更令牌，任一子令牌触发即视为触发
pub struct CompositeChangeToken {
    tokens: Vec<Arc<dyn ChangeToken>>,
}

impl CompositeChangeToken {
    /// 由子令牌创建组合令牌
    pub fn new(tokens: Vec<Arc<dyn ChangeToken>>) -> Self {
        Self { tokens }
    }

    /// 子令牌列表
    pub fn tokens(&self) -> &[Arc<dyn ChangeToken>] {
        &self.tokens
    }
}

impl ChangeToken for CompositeChangeToken {
    fn has_changed(&self) -> bool {
        self.tokens.iter().any(|token| token.has_changed())
    }

    fn active_change_callbacks(&self) -> bool {
        self.tokens.iter().any(|token| token.active_change_callbacks())
    }

    fn register_callback(&self, callback: ChangeCallback) -> CallbackRegistration {
        // 多个子令牌共享同一个回调，先触发的子令牌取走它
        let shared: Arc<Mutex<Option<ChangeCallback>>> = Arc::new(Mutex::new(Some(callback)));

        let registrations: Vec<CallbackRegistration> = self
            .tokens
            .iter()
            .map(|token| {
                let shared = Arc::clone(&shared);
                token.register_callback(Box::new(move || {
                    let callback = shared.lock().take();
                    if let Some(callback) = callback {
                        callback();
                    }
                }))
            })
            .collect();

        CallbackRegistration::new(move || {
            for registration in registrations {
                registration.dispose();
            }
        })
    }
}

/// 变更令牌源
///
/// 持有当前纪元的令牌；[`ChangeTokenSource::raise`] 先换入新令牌再触发旧令牌，
/// 因此回调中重新获取到的一定是下一个纪元的令牌。
pub struct ChangeTokenSource {
    current: ArcSwap<CancellationChangeToken>,
}

impl ChangeTokenSource {
    /// 创建令牌源
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(CancellationChangeToken::new()),
        }
    }

    /// 当前纪元的令牌
    pub fn token(&self) -> Arc<dyn ChangeToken> {
        self.current.load_full()
    }

    /// 结束当前纪元并触发其令牌
    pub fn raise(&self) {
        let previous = self.current.swap(Arc::new(CancellationChangeToken::new()));
        previous.fire();
    }
}

impl Default for ChangeTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChangeTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeTokenSource")
            .field("current", &*self.current.load())
            .finish()
    }
}

type TokenProducer = Box<dyn Fn() -> Arc<dyn ChangeToken> + Send + Sync>;
type ChangeConsumer = Box<dyn Fn() + Send + Sync>;

struct SubscriptionInner {
    producer: TokenProducer,
    consumer: ChangeConsumer,
    disposed: AtomicBool,
}

/// 持续变更订阅
///
/// 由 [`on_change`] 创建。订阅在被释放或显式 [`ChangeSubscription::dispose`] 之前，
/// 每次令牌触发后都会重新订阅生产者给出的下一个令牌。
pub struct ChangeSubscription {
    inner: Arc<SubscriptionInner>,
}

impl ChangeSubscription {
    /// 停止订阅
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::Release);
    }

    /// 订阅是否已停止
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for ChangeSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeSubscription")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// 订阅一串变更令牌
///
/// `producer` 每次返回当前纪元的令牌；令牌触发时先取得下一个令牌，再调用
/// `consumer`，最后在新令牌上重新注册。
pub fn on_change<P, C>(producer: P, consumer: C) -> ChangeSubscription
where
    P: Fn() -> Arc<dyn ChangeToken> + Send + Sync + 'static,
    C: Fn() + Send + Sync + 'static,
{
    let inner = Arc::new(SubscriptionInner {
        producer: Box::new(producer),
        consumer: Box::new(consumer),
        disposed: AtomicBool::new(false),
    });

    let token = (inner.producer)();
    arm(&inner, &token);
    ChangeSubscription { inner }
}

fn arm(inner: &Arc<SubscriptionInner>, token: &Arc<dyn ChangeToken>) {
    let weak = Arc::downgrade(inner);
    // 已注销的订阅在下一次触发时自然失效，不保留注册句柄
    let _registration = token.register_callback(Box::new(move || {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        if inner.disposed.load(Ordering::Acquire) {
            return;
        }
        let next = (inner.producer)();
        (inner.consumer)();
        if !inner.disposed.load(Ordering::Acquire) {
            arm(&inner, &next);
        }
    }));
}

/// 等待令牌触发
///
/// 对永不触发的令牌，返回的 future 也永远不会完成。
pub async fn wait_for_change(token: Arc<dyn ChangeToken>) {
    if token.has_changed() {
        return;
    }
    let (sender, receiver) = tokio::sync::oneshot::channel::<()>();
    let registration = token.register_callback(Box::new(move || {
        let _ = sender.send(());
    }));
    if receiver.await.is_err() {
        // 令牌被释放而未触发
        std::future::pending::<()>().await;
    }
    registration.dispose();
}
