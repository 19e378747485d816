//! # Config Macros
//!
//! 为选项类型生成 `config_common::Configurable` 实现的过程宏。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use config_macros::Configurable;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Default, Deserialize, Configurable)]
//! #[configurable(path = "Services:Cache")]
//! pub struct CacheOptions {
//!     pub capacity: usize,
//! }
//!
//! // 未指定路径时去掉类型名末尾的 `Options`
//! #[derive(Debug, Default, Deserialize, Configurable)]
//! pub struct LoggingOptions {
//!     pub level: String,
//! }
//! ```

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod configurable;
mod utils;

/// 可配置选项派生宏
///
/// # 参数
///
/// - `path = "Section:Child"` - 配置节路径，缺省时由类型名推断
///
/// 生成的代码引用 `::config_common`，使用方需要依赖该 crate。
#[proc_macro_derive(Configurable, attributes(configurable))]
pub fn derive_configurable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    configurable::derive_configurable_impl(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
