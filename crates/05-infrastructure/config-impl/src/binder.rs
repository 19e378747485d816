//! 类型化配置绑定器实现
//!
//! 把配置节实现为 `serde::Deserializer`，由 `#[derive(Deserialize)]` 生成的字段表驱动绑定：
//!
//! - 结构体字段忽略大小写匹配子配置节（支持 `#[serde(rename)]`）
//! - `Vec` 和元组按键顺序读取子配置节，映射按键读取子配置节
//! - 配置节不存在，或值为空且没有子节点时，`Option` 绑定为 `None`
//! - 标量通过 `FromStr` 从字符串解析，布尔值忽略大小写
//! - 枚举按变体名（忽略大小写）或唯一子配置节绑定

use crate::section::Section;
use config_abstractions::{Configuration, ConfigurationSection};
use config_common::{keys_equal, ConfigError};
use serde::de::value::StrDeserializer;
use serde::de::{
    self, DeserializeOwned, DeserializeSeed, Deserializer as _, EnumAccess, IntoDeserializer,
    MapAccess, SeqAccess, VariantAccess, Visitor,
};
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// 绑定错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{path}: {message}")]
pub struct BindError {
    /// 出错的配置节路径
    pub path: String,
    /// 错误信息
    pub message: String,
}

impl BindError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    /// 尚未记录路径时补上路径
    fn at(mut self, path: &str) -> Self {
        if self.path.is_empty() {
            self.path = path.to_string();
        }
        self
    }
}

impl de::Error for BindError {
    fn custom<T: Display>(msg: T) -> Self {
        Self::new(String::new(), msg.to_string())
    }
}

impl From<BindError> for ConfigError {
    fn from(error: BindError) -> Self {
        ConfigError::BindError {
            path: error.path,
            message: error.message,
        }
    }
}

/// 把配置节绑定为类型化对象
pub fn bind<T: DeserializeOwned>(section: &Section) -> Result<T, ConfigError> {
    debug!(
        "绑定配置到类型: {} -> {}",
        display_path(section.path()),
        std::any::type_name::<T>()
    );
    T::deserialize(SectionDeserializer::new(section.clone()))
        .map_err(|e| e.at(display_path(section.path())).into())
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "<root>"
    } else {
        path
    }
}

/// 配置节反序列化器
pub struct SectionDeserializer {
    section: Section,
}

impl SectionDeserializer {
    /// 创建配置节反序列化器
    pub fn new(section: Section) -> Self {
        Self { section }
    }

    fn path(&self) -> &str {
        display_path(self.section.path())
    }

    fn scalar(&self) -> Result<ScalarDeserializer, BindError> {
        match self.section.value() {
            Some(value) => Ok(ScalarDeserializer::new(value, self.path().to_string())),
            None if self.section.exists() => Err(BindError::new(
                self.path(),
                "需要标量值，但配置节只有子节点",
            )),
            None => Err(BindError::new(self.path(), "配置节不存在")),
        }
    }

    fn map_access(&self, fields: Option<&'static [&'static str]>) -> SectionMapAccess {
        SectionMapAccess {
            children: self.section.get_children().into_iter(),
            fields,
            pending: None,
        }
    }
}

macro_rules! forward_to_scalar {
    ($($method:ident),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
                self.scalar()?.$method(visitor)
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for SectionDeserializer {
    type Error = BindError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        let children = self.section.get_children();
        if !children.is_empty() {
            let path = self.path().to_string();
            return visitor
                .visit_map(SectionMapAccess {
                    children: children.into_iter(),
                    fields: None,
                    pending: None,
                })
                .map_err(|e| e.at(&path));
        }
        match self.section.value() {
            Some(value) => visitor.visit_string(value),
            None => visitor.visit_unit(),
        }
    }

    forward_to_scalar!(
        deserialize_bool,
        deserialize_i8,
        deserialize_i16,
        deserialize_i32,
        deserialize_i64,
        deserialize_i128,
        deserialize_u8,
        deserialize_u16,
        deserialize_u32,
        deserialize_u64,
        deserialize_u128,
        deserialize_f32,
        deserialize_f64,
        deserialize_char,
        deserialize_str,
        deserialize_string,
        deserialize_bytes,
        deserialize_byte_buf,
        deserialize_identifier,
    );

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        let has_children = !self.section.get_children().is_empty();
        let empty_value = matches!(self.section.value().as_deref(), None | Some(""));
        if !has_children && empty_value {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, BindError> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, BindError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        let path = self.path().to_string();
        visitor
            .visit_seq(SectionSeqAccess {
                children: self.section.get_children().into_iter(),
            })
            .map_err(|e| e.at(&path))
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, BindError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, BindError> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        let path = self.path().to_string();
        visitor.visit_map(self.map_access(None)).map_err(|e| e.at(&path))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, BindError> {
        let path = self.path().to_string();
        visitor
            .visit_map(self.map_access(Some(fields)))
            .map_err(|e| e.at(&path))
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, BindError> {
        let mut children = self.section.get_children();
        if children.is_empty() {
            return self.scalar()?.deserialize_enum(name, variants, visitor);
        }
        if children.len() != 1 {
            return Err(BindError::new(
                self.path(),
                format!("枚举配置节只能有一个子节点，实际有 {} 个", children.len()),
            ));
        }

        let content = children.remove(0);
        let variant = match_variant(content.key(), variants)
            .map_err(|message| BindError::new(self.path(), message))?;
        visitor.visit_enum(SectionEnumAccess { variant, content })
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_unit()
    }
}

struct SectionSeqAccess {
    children: std::vec::IntoIter<Section>,
}

impl<'de> SeqAccess<'de> for SectionSeqAccess {
    type Error = BindError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, BindError> {
        match self.children.next() {
            Some(child) => seed.deserialize(SectionDeserializer::new(child)).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.children.len())
    }
}

struct SectionMapAccess {
    children: std::vec::IntoIter<Section>,
    fields: Option<&'static [&'static str]>,
    pending: Option<Section>,
}

impl<'de> MapAccess<'de> for SectionMapAccess {
    type Error = BindError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, BindError> {
        let Some(child) = self.children.next() else {
            return Ok(None);
        };

        let key = self
            .fields
            .and_then(|fields| fields.iter().find(|field| keys_equal(field, child.key())))
            .map_or_else(|| child.key().to_string(), |field| field.to_string());
        let path = child.path().to_string();
        self.pending = Some(child);
        seed.deserialize(ScalarDeserializer::new(key, path)).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, BindError> {
        let child = self
            .pending
            .take()
            .ok_or_else(|| BindError::new(String::new(), "读取值之前没有读取键"))?;
        seed.deserialize(SectionDeserializer::new(child))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.children.len())
    }
}

struct SectionEnumAccess {
    variant: &'static str,
    content: Section,
}

impl<'de> EnumAccess<'de> for SectionEnumAccess {
    type Error = BindError;
    type Variant = SectionDeserializer;

    fn variant_seed<V: DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> Result<(V::Value, Self::Variant), BindError> {
        let name: StrDeserializer<'_, BindError> = self.variant.into_deserializer();
        let variant = seed.deserialize(name)?;
        Ok((variant, SectionDeserializer::new(self.content)))
    }
}

impl<'de> VariantAccess<'de> for SectionDeserializer {
    type Error = BindError;

    fn unit_variant(self) -> Result<(), BindError> {
        Ok(())
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(
        self,
        seed: T,
    ) -> Result<T::Value, BindError> {
        seed.deserialize(self)
    }

    fn tuple_variant<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, BindError> {
        de::Deserializer::deserialize_seq(self, visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, BindError> {
        de::Deserializer::deserialize_struct(self, "", fields, visitor)
    }
}

fn match_variant(name: &str, variants: &'static [&'static str]) -> Result<&'static str, String> {
    variants
        .iter()
        .copied()
        .find(|variant| keys_equal(variant, name))
        .ok_or_else(|| format!("未知的枚举值 '{}'，可选值: {}", name, variants.join(", ")))
}

/// 标量反序列化器，从字符串解析值
struct ScalarDeserializer {
    value: String,
    path: String,
}

impl ScalarDeserializer {
    fn new(value: String, path: String) -> Self {
        Self { value, path }
    }

    fn parse<T>(&self) -> Result<T, BindError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.value.trim().parse::<T>().map_err(|e| {
            BindError::new(
                self.path.as_str(),
                format!(
                    "无法将 '{}' 转换为 {}: {}",
                    self.value,
                    std::any::type_name::<T>(),
                    e
                ),
            )
        })
    }
}

macro_rules! parse_scalar {
    ($($method:ident => $visit:ident: $ty:ty),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
                visitor.$visit(self.parse::<$ty>()?)
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for ScalarDeserializer {
    type Error = BindError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_string(self.value)
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        let value = self.value.trim();
        if value.eq_ignore_ascii_case("true") {
            visitor.visit_bool(true)
        } else if value.eq_ignore_ascii_case("false") {
            visitor.visit_bool(false)
        } else {
            Err(BindError::new(
                self.path,
                format!("无法将 '{}' 转换为 bool", self.value),
            ))
        }
    }

    parse_scalar!(
        deserialize_i8 => visit_i8: i8,
        deserialize_i16 => visit_i16: i16,
        deserialize_i32 => visit_i32: i32,
        deserialize_i64 => visit_i64: i64,
        deserialize_i128 => visit_i128: i128,
        deserialize_u8 => visit_u8: u8,
        deserialize_u16 => visit_u16: u16,
        deserialize_u32 => visit_u32: u32,
        deserialize_u64 => visit_u64: u64,
        deserialize_u128 => visit_u128: u128,
        deserialize_f32 => visit_f32: f32,
        deserialize_f64 => visit_f64: f64,
    );

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        let mut chars = self.value.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => visitor.visit_char(c),
            _ => Err(BindError::new(
                self.path,
                format!("无法将 '{}' 转换为 char", self.value),
            )),
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_string(self.value)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_string(self.value)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_bytes(self.value.as_bytes())
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_byte_buf(self.value.into_bytes())
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        if self.value.is_empty() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, BindError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, BindError> {
        let variant = match_variant(self.value.trim(), variants)
            .map_err(|message| BindError::new(self.path.as_str(), message))?;
        visitor.visit_enum(variant.into_deserializer())
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, BindError> {
        visitor.visit_string(self.value)
    }

    serde::forward_to_deserialize_any! {
        unit_struct seq tuple tuple_struct map struct ignored_any
    }
}
