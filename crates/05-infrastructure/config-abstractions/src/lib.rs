//! # Configuration Abstractions
//!
//! 配置抽象层，定义分层配置的核心接口和约定。
//!
//! ## 核心接口
//!
//! - [`ConfigurationProvider`] - 配置提供者接口
//! - [`ConfigurationSource`] - 配置源接口，负责创建提供者
//! - [`Configuration`] - 合并视图的读取与导航接口
//! - [`ConfigurationRoot`] - 顶层配置接口
//! - [`FileWatcher`] - 文件变更监控接口
//! - [`ConfigEventListener`] - 配置事件监听接口

pub mod configuration;
pub mod events;
pub mod provider;
pub mod watcher;

pub use configuration::*;
pub use events::*;
pub use provider::*;
pub use watcher::*;
