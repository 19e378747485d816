//! Configurable 派生宏实现

use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, LitStr, Result};

use crate::utils::{default_config_path, validate_config_path};

/// 从 `#[configurable(...)]` 属性中读取配置路径
fn parse_config_path(input: &DeriveInput) -> Result<Option<LitStr>> {
    let mut config_path = None;

    for attr in &input.attrs {
        if !attr.path().is_ident("configurable") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("path") {
                let lit: LitStr = meta.value()?.parse()?;
                if config_path.is_some() {
                    return Err(meta.error("重复的 path 参数"));
                }
                config_path = Some(lit);
                Ok(())
            } else {
                Err(meta.error("未知的 configurable 参数，仅支持 path = \"...\""))
            }
        })?;
    }

    Ok(config_path)
}

/// 实现 #[derive(Configurable)]
pub fn derive_configurable_impl(input: &DeriveInput) -> Result<TokenStream> {
    let type_name = &input.ident;

    let config_path = match parse_config_path(input)? {
        Some(lit) => {
            let path = lit.value();
            validate_config_path(&path).map_err(|message| syn::Error::new(lit.span(), message))?;
            path
        }
        None => default_config_path(&type_name.to_string()),
    };

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::config_common::Configurable for #type_name #ty_generics #where_clause {
            fn get_config_path() -> &'static str {
                #config_path
            }
        }
    })
}
