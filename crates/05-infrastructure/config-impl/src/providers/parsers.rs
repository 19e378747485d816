//! 配置文件解析器
//!
//! 把层级文档展开成扁平的键值对：对象成员成为子段，数组元素以下标成为子段，
//! 标量成为终值。JSON、YAML、TOML 共用同一个 serde 访问器流式展开，
//! 条目保持文档顺序，同一文件内的重复键由存储层按最后一次出现为准。

use config_abstractions::FileFormat;
use config_common::{ConfigError, ConfigurationPath};
use serde::de::{self, DeserializeSeed, Deserializer, EnumAccess, MapAccess, SeqAccess, VariantAccess, Visitor};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// 扁平化后的键值对，按文档顺序排列
pub type FlatEntries = Vec<(String, String)>;

/// 文件解析器 trait
pub trait FileParser: Send + Sync {
    /// 解析器名称
    fn name(&self) -> &'static str;

    /// 解析文件内容，`source_name` 用于错误信息
    fn parse(&self, content: &str, source_name: &str) -> Result<FlatEntries, ConfigError>;
}

/// 获取指定格式的解析器
pub fn parser_for(format: FileFormat) -> Arc<dyn FileParser> {
    match format {
        FileFormat::Json => Arc::new(JsonFileParser),
        FileFormat::Yaml => Arc::new(YamlFileParser),
        FileFormat::Toml => Arc::new(TomlFileParser),
        FileFormat::Ini => Arc::new(IniFileParser),
    }
}

/// JSON 解析器
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFileParser;

impl FileParser for JsonFileParser {
    fn name(&self) -> &'static str {
        "json"
    }

    fn parse(&self, content: &str, source_name: &str) -> Result<FlatEntries, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut deserializer = serde_json::Deserializer::from_str(content);
        let entries = flatten_document(&mut deserializer)
            .and_then(|entries| deserializer.end().map(|()| entries))
            .map_err(|e| {
                ConfigError::parse_error_at(source_name, e.line(), Some(e.column()), e.to_string())
            })?;
        debug!("{} 展开为 {} 个键", source_name, entries.len());
        Ok(entries)
    }
}

/// YAML 解析器
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlFileParser;

impl FileParser for YamlFileParser {
    fn name(&self) -> &'static str {
        "yaml"
    }

    fn parse(&self, content: &str, source_name: &str) -> Result<FlatEntries, ConfigError> {
        let has_content = content.lines().any(|line| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        });
        if !has_content {
            return Ok(Vec::new());
        }

        let entries = flatten_document(serde_yaml::Deserializer::from_str(content)).map_err(|e| {
            match e.location() {
                Some(location) => ConfigError::parse_error_at(
                    source_name,
                    location.line(),
                    Some(location.column()),
                    e.to_string(),
                ),
                None => ConfigError::parse_error(source_name, e.to_string()),
            }
        })?;
        debug!("{} 展开为 {} 个键", source_name, entries.len());
        Ok(entries)
    }
}

/// TOML 解析器
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlFileParser;

impl FileParser for TomlFileParser {
    fn name(&self) -> &'static str {
        "toml"
    }

    fn parse(&self, content: &str, source_name: &str) -> Result<FlatEntries, ConfigError> {
        let entries = flatten_document(toml::Deserializer::new(content)).map_err(|e| {
            match e.span() {
                Some(span) => {
                    let (line, column) = line_and_column(content, span.start);
                    ConfigError::parse_error_at(source_name, line, Some(column), e.message())
                }
                None => ConfigError::parse_error(source_name, e.message()),
            }
        })?;
        debug!("{} 展开为 {} 个键", source_name, entries.len());
        Ok(entries)
    }
}

/// INI 解析器
///
/// `[Section]` 为后续键加上 `Section:` 前缀；以 `;`、`#`、`/` 开头的行是注释。
#[derive(Debug, Clone, Copy, Default)]
pub struct IniFileParser;

impl FileParser for IniFileParser {
    fn name(&self) -> &'static str {
        "ini"
    }

    fn parse(&self, content: &str, source_name: &str) -> Result<FlatEntries, ConfigError> {
        let mut entries = Vec::new();
        let mut section_prefix = String::new();

        for (index, raw_line) in content.lines().enumerate() {
            let line_number = index + 1;
            let line = raw_line.trim();

            if line.is_empty() || line.starts_with([';', '#', '/']) {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                let Some(section) = rest.strip_suffix(']') else {
                    return Err(ConfigError::parse_error_at(
                        source_name,
                        line_number,
                        None,
                        format!("节标题缺少 ']': {line}"),
                    ));
                };
                let section = section.trim();
                section_prefix = if section.is_empty() {
                    String::new()
                } else {
                    format!("{section}:")
                };
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::parse_error_at(
                    source_name,
                    line_number,
                    None,
                    format!("无法识别的行，缺少 '=': {line}"),
                ));
            };

            let key = key.trim();
            if key.is_empty() {
                return Err(ConfigError::parse_error_at(
                    source_name,
                    line_number,
                    None,
                    "键不能为空",
                ));
            }

            let mut value = value.trim();
            if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
                value = &value[1..value.len() - 1];
            }

            entries.push((format!("{section_prefix}{key}"), value.to_string()));
        }

        debug!("INI 文件 {} 解析出 {} 个键", source_name, entries.len());
        Ok(entries)
    }
}

/// TOML 日期时间在 serde 数据模型中表示为只含此字段的表
const TOML_DATETIME_FIELD: &str = "$__toml_private_datetime";

/// 以流式方式展开整个文档，根节点必须是对象
///
/// 条目按文档顺序输出，不检查重复键，重复键的取舍交给存储层。
fn flatten_document<'de, D>(deserializer: D) -> Result<FlatEntries, D::Error>
where
    D: Deserializer<'de>,
{
    let mut entries = Vec::new();
    DocumentSeed {
        entries: &mut entries,
    }
    .deserialize(deserializer)?;
    Ok(entries)
}

struct DocumentSeed<'a> {
    entries: &'a mut FlatEntries,
}

impl<'de> DeserializeSeed<'de> for DocumentSeed<'_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for DocumentSeed<'_> {
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("顶层为对象/表的文档")
    }

    // 空 YAML 文档
    fn visit_unit<E: de::Error>(self) -> Result<(), E> {
        Ok(())
    }

    fn visit_none<E: de::Error>(self) -> Result<(), E> {
        Ok(())
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<(), A::Error> {
        NodeSeed {
            prefix: String::new(),
            entries: self.entries,
        }
        .visit_map(map)
    }
}

/// 展开一个节点：对象成员与数组下标成为子段，标量写入 `prefix`
struct NodeSeed<'a> {
    prefix: String,
    entries: &'a mut FlatEntries,
}

impl NodeSeed<'_> {
    fn push<E>(self, value: impl ToString) -> Result<(), E> {
        self.entries.push((self.prefix, value.to_string()));
        Ok(())
    }

    fn child_path(&self, segment: &str) -> String {
        if self.prefix.is_empty() {
            segment.to_string()
        } else {
            ConfigurationPath::combine([self.prefix.as_str(), segment])
        }
    }
}

impl<'de> DeserializeSeed<'de> for NodeSeed<'_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for NodeSeed<'_> {
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("配置值")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<(), E> {
        self.push(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<(), E> {
        self.push(v)
    }

    fn visit_i128<E: de::Error>(self, v: i128) -> Result<(), E> {
        self.push(v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<(), E> {
        self.push(v)
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<(), E> {
        self.push(v)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<(), E> {
        self.push(v)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<(), E> {
        self.push(v)
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<(), E> {
        self.entries.push((self.prefix, v));
        Ok(())
    }

    fn visit_unit<E: de::Error>(self) -> Result<(), E> {
        self.push("")
    }

    fn visit_none<E: de::Error>(self) -> Result<(), E> {
        self.push("")
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        self.deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        let mut index = 0usize;
        loop {
            let child = NodeSeed {
                prefix: self.child_path(&index.to_string()),
                entries: &mut *self.entries,
            };
            if seq.next_element_seed(child)?.is_none() {
                return Ok(());
            }
            index += 1;
        }
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        while let Some(key) = map.next_key_seed(KeySeed)? {
            let prefix = if key == TOML_DATETIME_FIELD {
                self.prefix.clone()
            } else {
                self.child_path(&key)
            };
            map.next_value_seed(NodeSeed {
                prefix,
                entries: &mut *self.entries,
            })?;
        }
        Ok(())
    }

    // YAML 自定义标签，忽略标签只取值
    fn visit_enum<A: EnumAccess<'de>>(self, data: A) -> Result<(), A::Error> {
        let (_, variant) = data.variant::<de::IgnoredAny>()?;
        variant.newtype_variant_seed(self)
    }
}

/// 对象键，非字符串的标量键转换为字符串
struct KeySeed;

impl<'de> DeserializeSeed<'de> for KeySeed {
    type Value = String;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<String, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for KeySeed {
    type Value = String;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("标量键")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
        Ok(v)
    }

    fn visit_unit<E: de::Error>(self) -> Result<String, E> {
        Ok(String::new())
    }
}

/// 由字节偏移计算行列号（均从 1 开始）
fn line_and_column(content: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(content.len());
    let before = &content[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before
        .rfind('\n')
        .map_or(before.chars().count(), |index| before[index + 1..].chars().count())
        + 1;
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FlatKeyStore;

    fn as_map(entries: FlatEntries) -> std::collections::HashMap<String, String> {
        entries.into_iter().collect()
    }

    #[test]
    fn test_json_nested_object_flattens_to_single_entry() {
        let entries = JsonFileParser.parse(r#"{"A": {"B": "v"}}"#, "test.json").unwrap();
        assert_eq!(entries, vec![("A:B".to_string(), "v".to_string())]);
    }

    #[test]
    fn test_json_arrays_and_scalars() {
        let entries = as_map(
            JsonFileParser
                .parse(
                    r#"{"Servers": [{"Host": "a", "Port": 80}, {"Host": "b"}], "Debug": true, "Ratio": 0.5, "Empty": null}"#,
                    "test.json",
                )
                .unwrap(),
        );
        assert_eq!(entries["Servers:0:Host"], "a");
        assert_eq!(entries["Servers:0:Port"], "80");
        assert_eq!(entries["Servers:1:Host"], "b");
        assert_eq!(entries["Debug"], "true");
        assert_eq!(entries["Ratio"], "0.5");
        assert_eq!(entries["Empty"], "");
    }

    #[test]
    fn test_json_empty_containers_produce_no_entries() {
        let entries = JsonFileParser
            .parse(r#"{"Empty": {}, "None": []}"#, "test.json")
            .unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_json_parse_error_reports_position() {
        let error = JsonFileParser
            .parse("{\n  \"A\": \n}", "broken.json")
            .unwrap_err();
        match error {
            ConfigError::ParseError {
                source_name, line, ..
            } => {
                assert_eq!(source_name, "broken.json");
                assert_eq!(line, Some(3));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_json_top_level_must_be_object() {
        assert!(JsonFileParser.parse("[1, 2]", "array.json").is_err());
        assert!(JsonFileParser.parse("   ", "blank.json").unwrap().is_empty());
    }

    #[test]
    fn test_yaml_flattening() {
        let content = "Logging:\n  Level: Debug\n  Targets:\n    - console\n    - file\nPort: 8080\n";
        let entries = as_map(YamlFileParser.parse(content, "app.yaml").unwrap());
        assert_eq!(entries["Logging:Level"], "Debug");
        assert_eq!(entries["Logging:Targets:0"], "console");
        assert_eq!(entries["Logging:Targets:1"], "file");
        assert_eq!(entries["Port"], "8080");
    }

    #[test]
    fn test_yaml_parse_error_has_location() {
        let error = YamlFileParser
            .parse("a: [1, 2\nb: 3\n", "bad.yaml")
            .unwrap_err();
        assert!(matches!(error, ConfigError::ParseError { line: Some(_), .. }));
    }

    #[test]
    fn test_toml_flattening() {
        let content = "title = \"demo\"\n[server]\nport = 8080\nhosts = [\"a\", \"b\"]\n[[workers]]\nname = \"w1\"\n";
        let entries = as_map(TomlFileParser.parse(content, "app.toml").unwrap());
        assert_eq!(entries["title"], "demo");
        assert_eq!(entries["server:port"], "8080");
        assert_eq!(entries["server:hosts:1"], "b");
        assert_eq!(entries["workers:0:name"], "w1");
    }

    #[test]
    fn test_toml_parse_error_has_line() {
        let error = TomlFileParser
            .parse("a = 1\nb = = 2\n", "bad.toml")
            .unwrap_err();
        match error {
            ConfigError::ParseError { line, .. } => assert_eq!(line, Some(2)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_ini_sections_comments_and_quotes() {
        let content = "; comment\n# another\nRoot = top\n[Database]\nHost = localhost\nName = \"orders db\"\n[Database:Pool]\nSize=10\n";
        let entries = as_map(IniFileParser.parse(content, "app.ini").unwrap());
        assert_eq!(entries["Root"], "top");
        assert_eq!(entries["Database:Host"], "localhost");
        assert_eq!(entries["Database:Name"], "orders db");
        assert_eq!(entries["Database:Pool:Size"], "10");
    }

    #[test]
    fn test_ini_line_without_equals_is_error() {
        let error = IniFileParser
            .parse("[A]\nkey = 1\nbroken\n", "bad.ini")
            .unwrap_err();
        match error {
            ConfigError::ParseError { line, .. } => assert_eq!(line, Some(3)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_yaml_duplicate_keys_last_write_wins() {
        let content = "Key: first\nNested:\n  Value: 1\nKey: second\nNested:\n  Value: 2\n";
        let entries = YamlFileParser.parse(content, "dup.yaml").unwrap();
        assert_eq!(
            entries,
            vec![
                ("Key".to_string(), "first".to_string()),
                ("Nested:Value".to_string(), "1".to_string()),
                ("Key".to_string(), "second".to_string()),
                ("Nested:Value".to_string(), "2".to_string()),
            ]
        );

        let store = FlatKeyStore::from_entries(entries);
        assert_eq!(store.get("key").as_deref(), Some("second"));
        assert_eq!(store.get("nested:value").as_deref(), Some("2"));
    }

    #[test]
    fn test_json_keeps_document_order_for_case_variants() {
        let entries = JsonFileParser
            .parse(r#"{"key": "first", "Key": "second"}"#, "case.json")
            .unwrap();
        assert_eq!(
            entries,
            vec![
                ("key".to_string(), "first".to_string()),
                ("Key".to_string(), "second".to_string()),
            ]
        );
        let store = FlatKeyStore::from_entries(entries);
        assert_eq!(store.get("KEY").as_deref(), Some("second"));
    }

    #[test]
    fn test_toml_keeps_document_order_for_case_variants() {
        let entries = TomlFileParser
            .parse("zeta = 1\nkey = \"first\"\nKey = \"second\"\n", "case.toml")
            .unwrap();
        let keys: Vec<&str> = entries.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "key", "Key"]);
        let store = FlatKeyStore::from_entries(entries);
        assert_eq!(store.get("key").as_deref(), Some("second"));
    }

    #[test]
    fn test_toml_datetime_is_scalar() {
        let entries = as_map(
            TomlFileParser
                .parse("[Release]\nDate = 2024-05-01T10:00:00Z\n", "dates.toml")
                .unwrap(),
        );
        assert_eq!(entries.len(), 1);
        assert_eq!(entries["Release:Date"], "2024-05-01T10:00:00Z");
    }

    #[test]
    fn test_yaml_comment_only_document_is_empty() {
        assert!(YamlFileParser.parse("# only a comment\n", "empty.yaml").unwrap().is_empty());
    }

    #[test]
    fn test_json_trailing_content_is_error() {
        assert!(JsonFileParser.parse(r#"{"A": 1} {"B": 2}"#, "two.json").is_err());
    }

    #[test]
    fn test_line_and_column() {
        assert_eq!(line_and_column("abc\ndef", 5), (2, 2));
        assert_eq!(line_and_column("abc", 0), (1, 1));
    }
}
