//! 错误类型定义

use thiserror::Error;

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    #[error("配置文件读取失败: {path}: {source}")]
    FileReadError {
        path: String,
        source: std::io::Error,
    },

    #[error("配置解析失败: {source_name}{}: {message}", position_suffix(.line, .column))]
    ParseError {
        /// 出错的配置源（通常是文件路径）
        source_name: String,
        /// 出错行号（从 1 开始）
        line: Option<usize>,
        /// 出错列号（从 1 开始）
        column: Option<usize>,
        message: String,
    },

    #[error("无效的命令行参数 '{argument}': {message}")]
    InvalidArgument { argument: String, message: String },

    #[error("无效的命令行开关映射 '{switch}': {message}")]
    InvalidSwitchMapping { switch: String, message: String },

    #[error("配置绑定失败: {path}: {message}")]
    BindError { path: String, message: String },

    #[error("配置类型转换失败: {key}: {message}")]
    TypeConversionError { key: String, message: String },

    #[error("配置重载失败: {message}")]
    ReloadError { message: String },

    #[error("配置文件监控失败: {message}")]
    WatchError { message: String },
}

impl ConfigError {
    /// 创建解析错误
    pub fn parse_error(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseError {
            source_name: source_name.into(),
            line: None,
            column: None,
            message: message.into(),
        }
    }

    /// 创建带位置信息的解析错误
    pub fn parse_error_at(
        source_name: impl Into<String>,
        line: usize,
        column: Option<usize>,
        message: impl Into<String>,
    ) -> Self {
        Self::ParseError {
            source_name: source_name.into(),
            line: Some(line),
            column,
            message: message.into(),
        }
    }

    /// 创建命令行参数错误
    pub fn invalid_argument(argument: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument: argument.into(),
            message: message.into(),
        }
    }

    /// 是否为“配置源不存在”
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::FileNotFound { .. })
    }
}

fn position_suffix(line: &Option<usize>, column: &Option<usize>) -> String {
    match (line, column) {
        (Some(line), Some(column)) => format!(" (行 {line}, 列 {column})"),
        (Some(line), None) => format!(" (行 {line})"),
        _ => String::new(),
    }
}

/// 结果类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;
