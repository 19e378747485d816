//! 宏工具函数

/// 配置键分隔符，与 `config_common::KEY_DELIMITER` 保持一致
const KEY_DELIMITER: char = ':';

const OPTIONS_SUFFIX: &str = "Options";

/// 由类型名推断配置节路径
///
/// 去掉末尾的 `Options`，若去掉后为空则保留原名。
pub fn default_config_path(type_name: &str) -> String {
    match type_name.strip_suffix(OPTIONS_SUFFIX) {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => type_name.to_string(),
    }
}

/// 检查配置节路径：非空、段不为空、不含首尾空白
pub fn validate_config_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("配置路径不能为空".to_string());
    }
    if path.trim() != path {
        return Err(format!("配置路径 '{path}' 不能包含首尾空白"));
    }
    if path.split(KEY_DELIMITER).any(str::is_empty) {
        return Err(format!(
            "配置路径 '{path}' 包含空段，段之间使用单个 '{KEY_DELIMITER}' 分隔"
        ));
    }
    Ok(())
}
