//! # Configuration Implementation
//!
//! 分层配置的具体实现，提供各种配置源、合并视图和类型化选项。
//!
//! ## 主要组件
//!
//! - [`ConfigurationBuilder`] - 按注册顺序收集配置源并构建组合配置
//! - [`CompositeConfiguration`] - 合并多个提供者，后注册者优先
//! - [`Section`] - 以路径前缀限定的配置视图
//! - [`FileConfigurationProvider`] - JSON / YAML / TOML / INI 文件提供者，支持防抖重载
//! - [`EnvironmentVariablesConfigurationProvider`] - 环境变量提供者
//! - [`CommandLineConfigurationProvider`] - 命令行参数提供者
//! - [`NotifyFileWatcher`] - 基于 notify 的文件监控器
//! - [`ConfigEventHandler`] - 重载事件分发
//! - [`OptionsMonitor`] - 随配置变化自动更新的类型化选项
//!
//! ## 使用示例
//!
//! ```no_run
//! use config_impl::{Configuration, ConfigurationBuilder};
//!
//! # fn main() -> Result<(), config_common::ConfigError> {
//! let config = ConfigurationBuilder::new()
//!     .add_json_file("appsettings.json", false, true)
//!     .add_environment_variables(Some("APP_"))
//!     .build()?;
//!
//! let level = config.get("Logging:LogLevel:Default");
//! let port: Option<u16> = config.get_section("Server").get_value("Port")?;
//! # let _ = (level, port);
//! # Ok(())
//! # }
//! ```

pub mod binder;
pub mod builder;
pub mod event_handler;
pub mod options;
pub mod providers;
pub mod root;
pub mod section;
pub mod store;
pub mod watcher;

pub use binder::{bind, BindError, SectionDeserializer};
pub use builder::*;
pub use event_handler::*;
pub use options::*;
pub use providers::*;
pub use root::*;
pub use section::*;
pub use store::*;
pub use watcher::{NotifyFileWatcher, WatchMode};

pub use config_abstractions::{
    Configuration, ConfigurationProvider, ConfigurationRoot, ConfigurationSection,
    ConfigurationSource, FileFormat, FileWatcher,
};

#[cfg(test)]
mod tests;
