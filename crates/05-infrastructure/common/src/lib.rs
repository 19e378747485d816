//! # Config Common
//!
//! 这个 crate 提供了 Lorn Config 各层共享的基础类型。
//!
//! ## 核心组件
//!
//! - [`ConfigError`] - 统一的配置错误类型
//! - [`ConfigurationPath`] - 层级配置键的拼接、拆分与排序
//! - [`ChangeToken`] - 单次触发的变更令牌及其组合工具
//! - [`Configurable`] - 拥有默认配置节路径的选项类型
//!
//! ## 设计原则
//!
//! - 配置值一律以字符串存储，类型转换发生在使用端
//! - 键比较不区分大小写
//! - 变更令牌只触发一次，持续观察需要重新订阅

pub mod change_token;
pub mod configuration;
pub mod errors;
pub mod path;

pub use change_token::*;
pub use configuration::*;
pub use errors::*;
pub use path::*;
