//! 层级配置键工具
//!
//! 配置键由若干路径段通过 [`KEY_DELIMITER`] 拼接而成，例如 `Logging:LogLevel:Default`。
//! 数组元素以从 0 开始的下标作为路径段，例如 `Servers:0:Host`。

use std::cmp::Ordering;

/// 配置键分隔符
pub const KEY_DELIMITER: &str = ":";

/// 配置路径工具
#[derive(Debug, Clone, Copy)]
pub struct ConfigurationPath;

impl ConfigurationPath {
    /// 拼接路径段
    pub fn combine<I, S>(segments: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut path = String::new();
        for (index, segment) in segments.into_iter().enumerate() {
            if index > 0 {
                path.push_str(KEY_DELIMITER);
            }
            path.push_str(segment.as_ref());
        }
        path
    }

    /// 获取路径的最后一段
    pub fn get_section_key(path: &str) -> &str {
        match path.rfind(KEY_DELIMITER) {
            Some(index) => &path[index + KEY_DELIMITER.len()..],
            None => path,
        }
    }

    /// 获取父路径，单段路径没有父路径
    pub fn get_parent_path(path: &str) -> Option<&str> {
        path.rfind(KEY_DELIMITER).map(|index| &path[..index])
    }

    /// 若 `key` 位于 `parent` 之下，返回紧邻 `parent` 的子段名
    ///
    /// `parent` 为 `None` 时表示根节点，返回 `key` 的第一段。
    /// 匹配不区分大小写，返回的子段保留 `key` 中的原始大小写。
    pub fn immediate_child<'a>(key: &'a str, parent: Option<&str>) -> Option<&'a str> {
        let mut key_segments = key.split(KEY_DELIMITER);
        if let Some(parent) = parent {
            for parent_segment in parent.split(KEY_DELIMITER) {
                let key_segment = key_segments.next()?;
                if !keys_equal(key_segment, parent_segment) {
                    return None;
                }
            }
        }
        key_segments.next()
    }
}

/// 归一化配置键，用作不区分大小写的查找键
pub fn fold_key(key: &str) -> String {
    key.to_lowercase()
}

/// 不区分大小写比较两个配置键
pub fn keys_equal(left: &str, right: &str) -> bool {
    left.eq_ignore_ascii_case(right) || left.to_lowercase() == right.to_lowercase()
}

/// 配置键排序规则
///
/// 逐段比较：两段都是整数时按数值比较，整数段排在非整数段之前，
/// 其余情况按不区分大小写的序数比较；前缀相同时较短的键在前。
pub fn compare_keys(left: &str, right: &str) -> Ordering {
    let mut left_segments = left.split(KEY_DELIMITER);
    let mut right_segments = right.split(KEY_DELIMITER);

    loop {
        match (left_segments.next(), right_segments.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ordering = compare_segments(l, r);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

fn compare_segments(left: &str, right: &str) -> Ordering {
    match (left.parse::<u64>(), right.parse::<u64>()) {
        (Ok(l), Ok(r)) => l.cmp(&r),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => left.to_lowercase().cmp(&right.to_lowercase()),
    }
}
