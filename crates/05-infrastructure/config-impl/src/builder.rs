//! 配置构建器

use crate::event_handler::ConfigEventHandler;
use crate::providers::{
    ChainedConfigurationSource, CommandLineConfigurationSource,
    EnvironmentVariablesConfigurationSource, FileConfigurationSource, MemoryConfigurationSource,
};
use crate::root::CompositeConfiguration;
use config_abstractions::{ConfigurationProvider, ConfigurationSource, FileFormat};
use config_common::ConfigError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

enum SourceEntry {
    File(FileConfigurationSource),
    Other(Arc<dyn ConfigurationSource>),
}

/// 配置构建器
///
/// 按注册顺序收集配置源，后注册的配置源优先级更高。
/// [`ConfigurationBuilder::build`] 先创建所有提供者，再依次加载。
#[derive(Default)]
pub struct ConfigurationBuilder {
    sources: Vec<SourceEntry>,
    base_path: Option<PathBuf>,
    event_handler: Option<Arc<ConfigEventHandler>>,
}

impl ConfigurationBuilder {
    /// 创建构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置相对文件路径的基准目录
    pub fn set_base_path(mut self, base_path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    /// 设置文件重载事件处理器
    ///
    /// 未单独指定事件处理器的文件配置源都会使用它。
    pub fn with_event_handler(mut self, handler: Arc<ConfigEventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// 添加配置源
    pub fn add_source(mut self, source: Arc<dyn ConfigurationSource>) -> Self {
        self.sources.push(SourceEntry::Other(source));
        self
    }

    /// 添加内存配置
    pub fn add_in_memory<I, K, V>(self, data: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.add_source(Arc::new(MemoryConfigurationSource::new(data)))
    }

    /// 添加文件配置源
    pub fn add_file_source(mut self, source: FileConfigurationSource) -> Self {
        self.sources.push(SourceEntry::File(source));
        self
    }

    /// 添加 JSON 文件
    pub fn add_json_file(self, path: impl AsRef<Path>, optional: bool, reload_on_change: bool) -> Self {
        self.add_format_file(path, FileFormat::Json, optional, reload_on_change)
    }

    /// 添加 YAML 文件
    pub fn add_yaml_file(self, path: impl AsRef<Path>, optional: bool, reload_on_change: bool) -> Self {
        self.add_format_file(path, FileFormat::Yaml, optional, reload_on_change)
    }

    /// 添加 TOML 文件
    pub fn add_toml_file(self, path: impl AsRef<Path>, optional: bool, reload_on_change: bool) -> Self {
        self.add_format_file(path, FileFormat::Toml, optional, reload_on_change)
    }

    /// 添加 INI 文件
    pub fn add_ini_file(self, path: impl AsRef<Path>, optional: bool, reload_on_change: bool) -> Self {
        self.add_format_file(path, FileFormat::Ini, optional, reload_on_change)
    }

    fn add_format_file(
        self,
        path: impl AsRef<Path>,
        format: FileFormat,
        optional: bool,
        reload_on_change: bool,
    ) -> Self {
        self.add_file_source(
            FileConfigurationSource::new(path.as_ref())
                .with_format(format)
                .optional(optional)
                .reload_on_change(reload_on_change),
        )
    }

    /// 添加环境变量，`prefix` 匹配时忽略大小写并在加载后去除
    pub fn add_environment_variables(self, prefix: Option<&str>) -> Self {
        self.add_source(Arc::new(EnvironmentVariablesConfigurationSource::new(
            prefix.map(str::to_string),
        )))
    }

    /// 添加命令行参数
    pub fn add_command_line<I, S>(self, args: I, switch_mappings: Option<HashMap<String, String>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut source = CommandLineConfigurationSource::new(args);
        source.switch_mappings = switch_mappings;
        self.add_source(Arc::new(source))
    }

    /// 接入已有配置
    pub fn add_configuration(self, configuration: &CompositeConfiguration) -> Self {
        self.add_source(Arc::new(ChainedConfigurationSource::new(
            configuration.clone(),
        )))
    }

    /// 已注册的配置源数量
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    fn resolve_file_source(&self, source: &FileConfigurationSource) -> FileConfigurationSource {
        let mut source = source.clone();
        if let Some(base_path) = &self.base_path {
            if source.path.is_relative() {
                source.path = base_path.join(&source.path);
            }
        }
        if source.event_handler.is_none() {
            source.event_handler = self.event_handler.clone();
        }
        source
    }

    /// 创建并加载所有提供者
    pub fn build(&self) -> Result<CompositeConfiguration, ConfigError> {
        let mut providers: Vec<Arc<dyn ConfigurationProvider>> =
            Vec::with_capacity(self.sources.len());
        for entry in &self.sources {
            let provider = match entry {
                SourceEntry::File(source) => self.resolve_file_source(source).build()?,
                SourceEntry::Other(source) => source.build()?,
            };
            debug!("创建配置提供者: {}", provider.name());
            providers.push(provider);
        }

        for provider in &providers {
            provider.load()?;
            info!("加载配置提供者: {}", provider.name());
        }

        info!("配置构建完成，共 {} 个提供者", providers.len());
        Ok(CompositeConfiguration::new(providers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_abstractions::{Configuration, ConfigurationRoot};
    use std::fs;

    #[test]
    fn test_build_orders_providers_by_registration() {
        let config = ConfigurationBuilder::new()
            .add_in_memory([("Key", "memory"), ("Only", "memory")])
            .add_command_line(["--Key=cli"], None)
            .build()
            .unwrap();

        assert_eq!(config.providers().len(), 2);
        assert_eq!(config.get("key").as_deref(), Some("cli"));
        assert_eq!(config.get("only").as_deref(), Some("memory"));
    }

    #[test]
    fn test_base_path_resolves_relative_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.toml"), "[Server]\nPort = 8080\n").unwrap();

        let config = ConfigurationBuilder::new()
            .add_toml_file("app.toml", false, false)
            .add_json_file("missing.json", true, false)
            .set_base_path(dir.path())
            .build()
            .unwrap();

        assert_eq!(config.get("server:port").as_deref(), Some("8080"));
    }

    #[test]
    fn test_missing_required_file_fails_build() {
        let dir = tempfile::tempdir().unwrap();
        let error = ConfigurationBuilder::new()
            .set_base_path(dir.path())
            .add_yaml_file("required.yaml", false, false)
            .build()
            .unwrap_err();
        assert!(error.is_not_found());
    }

    #[test]
    fn test_invalid_command_line_fails_before_any_load() {
        let dir = tempfile::tempdir().unwrap();
        let error = ConfigurationBuilder::new()
            .set_base_path(dir.path())
            .add_json_file("required.json", false, false)
            .add_command_line(["-x", "1"], None)
            .build()
            .unwrap_err();
        assert!(matches!(error, ConfigError::InvalidArgument { .. }));
    }

    #[test]
    fn test_chained_configuration() {
        let base = ConfigurationBuilder::new()
            .add_in_memory([("Name", "base"), ("Extra", "1")])
            .build()
            .unwrap();
        let config = ConfigurationBuilder::new()
            .add_configuration(&base)
            .add_in_memory([("Name", "override")])
            .build()
            .unwrap();

        assert_eq!(config.get("Name").as_deref(), Some("override"));
        assert_eq!(config.get("Extra").as_deref(), Some("1"));
    }
}
