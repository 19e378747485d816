//! 配置文件监控抽象接口

use config_common::{ChangeToken, ConfigError};
use std::path::Path;
use std::sync::Arc;

/// 文件监控器 trait
///
/// 为指定文件签发变更令牌，文件被创建、修改或删除后令牌触发。
pub trait FileWatcher: Send + Sync {
    /// 监控文件，返回当前纪元的变更令牌
    fn watch(&self, path: &Path) -> Result<Arc<dyn ChangeToken>, ConfigError>;
}

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    /// JSON 文件
    Json,
    /// YAML 文件
    Yaml,
    /// TOML 文件
    Toml,
    /// INI 文件
    Ini,
}

impl FileFormat {
    /// 根据扩展名推断文件格式
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension().and_then(|ext| ext.to_str())?;
        match extension.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            "ini" | "cfg" => Some(Self::Ini),
            _ => None,
        }
    }

    /// 格式名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toml => "toml",
            Self::Ini => "ini",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            FileFormat::from_path(Path::new("appsettings.json")),
            Some(FileFormat::Json)
        );
        assert_eq!(
            FileFormat::from_path(Path::new("config/app.YML")),
            Some(FileFormat::Yaml)
        );
        assert_eq!(
            FileFormat::from_path(Path::new("app.toml")),
            Some(FileFormat::Toml)
        );
        assert_eq!(
            FileFormat::from_path(Path::new("legacy.cfg")),
            Some(FileFormat::Ini)
        );
        assert_eq!(FileFormat::from_path(Path::new("README")), None);
        assert_eq!(FileFormat::from_path(Path::new("notes.txt")), None);
    }
}
