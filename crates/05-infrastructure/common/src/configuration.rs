//! 选项类型的配置约定

/// 可配置选项 trait
///
/// 实现此 trait 的选项类型声明自己默认绑定的配置节路径，
/// 通常通过 `#[derive(Configurable)]` 自动生成。
pub trait Configurable {
    /// 获取配置节路径，例如 `Logging:Console`
    fn get_config_path() -> &'static str;
}
