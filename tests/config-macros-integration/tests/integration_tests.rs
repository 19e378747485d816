//! 配置宏集成测试

use config_common::Configurable;
use config_impl::{ConfigurationBuilder, Options, OptionsFactory, OptionsMonitor};
use config_macros::Configurable;
use serde::Deserialize;

/// 显式路径
#[derive(Debug, Default, Clone, Deserialize, Configurable)]
#[configurable(path = "Services:Cache")]
#[serde(default, rename_all = "PascalCase")]
pub struct CacheOptions {
    pub capacity: usize,
    pub eviction: String,
}

/// 由类型名推断路径
#[derive(Debug, Default, Clone, Deserialize, Configurable)]
#[serde(default, rename_all = "PascalCase")]
pub struct LoggingOptions {
    pub level: String,
    pub include_scopes: bool,
}

/// 泛型选项
#[derive(Debug, Default, Deserialize, Configurable)]
#[configurable(path = "Pool")]
pub struct PoolOptions<T> {
    pub items: Vec<T>,
}

#[test]
fn test_explicit_and_inferred_paths() {
    assert_eq!(CacheOptions::get_config_path(), "Services:Cache");
    assert_eq!(LoggingOptions::get_config_path(), "Logging");
    assert_eq!(PoolOptions::<u32>::get_config_path(), "Pool");
}

#[test]
fn test_derived_path_drives_binding() {
    let config = ConfigurationBuilder::new()
        .add_in_memory([
            ("Services:Cache:Capacity", "256"),
            ("Services:Cache:Eviction", "lru"),
            ("Logging:Level", "debug"),
            ("Logging:IncludeScopes", "TRUE"),
            ("Pool:Items:0", "3"),
            ("Pool:Items:1", "5"),
        ])
        .build()
        .unwrap();

    let cache = Options::new(&OptionsFactory::<CacheOptions>::from_configurable(&config)).unwrap();
    assert_eq!(cache.value().capacity, 256);
    assert_eq!(cache.value().eviction, "lru");

    let logging = OptionsMonitor::new(OptionsFactory::<LoggingOptions>::from_configurable(&config));
    let current = logging.current_value().unwrap();
    assert_eq!(current.level, "debug");
    assert!(current.include_scopes);

    let pool = OptionsFactory::<PoolOptions<u32>>::from_configurable(&config)
        .create(config_impl::DEFAULT_NAME)
        .unwrap();
    assert_eq!(pool.items, vec![3, 5]);
}

#[test]
fn test_trybuild_configurable() {
    let t = trybuild::TestCases::new();
    t.pass("tests/trybuild/configurable_ok.rs");
}
