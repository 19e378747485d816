//! 配置提供者实现
//!
//! - [`MemoryConfigurationProvider`] - 内存键值对
//! - [`EnvironmentVariablesConfigurationProvider`] - 进程环境变量
//! - [`CommandLineConfigurationProvider`] - 命令行参数
//! - [`FileConfigurationProvider`] - JSON / YAML / TOML / INI 文件
//! - [`ChainedConfigurationProvider`] - 把已有配置作为提供者接入

pub mod chained;
pub mod command_line;
pub mod environment;
pub mod file;
pub mod memory;
pub mod parsers;

pub use chained::*;
pub use command_line::*;
pub use environment::*;
pub use file::*;
pub use memory::*;
pub use parsers::{parser_for, FileParser, FlatEntries, IniFileParser, JsonFileParser, TomlFileParser, YamlFileParser};
