//! # 演示程序
//!
//! 演示分层配置的加载顺序、配置节绑定和文件热重载：
//!
//! 1. `appsettings.json`
//! 2. `appsettings.{environment}.yaml`（可选）
//! 3. 带前缀的环境变量，例如 `DEMO_Server__Port=9000`
//! 4. `--` 之后的命令行参数，例如 `-- --Server:Port=9001` 或 `-- -p 9001`

use anyhow::Context;
use clap::Parser;
use config_impl::{
    CompositeConfiguration, ConfigEventHandler, Configuration, ConfigurationBuilder,
    LoggingConfigEventListener, OptionsFactory, OptionsMonitor,
};
use config_macros::Configurable;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "demo-app")]
#[command(about = "Lorn Config 分层配置演示")]
struct Args {
    /// 配置文件目录
    #[arg(short, long, default_value = "config")]
    config: PathBuf,

    /// 运行环境，决定叠加哪个环境配置文件
    #[arg(short, long, default_value = "Development")]
    environment: String,

    /// 监控配置文件变化，直到按下 Ctrl+C
    #[arg(long)]
    watch: bool,

    /// 环境变量前缀
    #[arg(long, default_value = "DEMO_")]
    env_prefix: String,

    /// 配置覆盖参数
    #[arg(last = true)]
    overrides: Vec<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Configurable)]
#[serde(default, rename_all = "PascalCase")]
struct ServerOptions {
    host: String,
    port: u16,
    allowed_origins: Vec<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct CacheOptions {
    capacity: usize,
    ttl_seconds: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("启动配置演示，环境: {}", args.environment);

    let events = Arc::new(ConfigEventHandler::new());
    events.register_listener(Arc::new(LoggingConfigEventListener::new()));

    let config = build_configuration(&args, events)?;
    println!("{}", config.debug_view());

    let server = OptionsMonitor::new(OptionsFactory::<ServerOptions>::from_configurable(&config));
    let caches = OptionsMonitor::new(
        OptionsFactory::<CacheOptions>::new()
            .bind_named("hot", config.get_section("Caches:Hot"))
            .bind_named("cold", config.get_section("Caches:Cold"))
            .post_configure_all(|cache| cache.capacity = cache.capacity.max(1)),
    );

    let current = server.current_value().context("绑定 Server 配置失败")?;
    info!("服务地址: {}:{}，允许来源: {:?}", current.host, current.port, current.allowed_origins);
    for name in ["hot", "cold"] {
        let cache = caches.get(name)?;
        info!("缓存 {}: 容量 {}，过期 {} 秒", name, cache.capacity, cache.ttl_seconds);
    }

    if !args.watch {
        return Ok(());
    }

    let _server_changes = server.on_change(|options: &ServerOptions, _| {
        info!("Server 配置已更新: {}:{}", options.host, options.port);
    });
    let _cache_changes = caches.on_change(|cache: &CacheOptions, name| {
        info!("缓存 {} 配置已更新: 容量 {}", name, cache.capacity);
    });

    info!("正在监控配置文件，按 Ctrl+C 退出");
    tokio::signal::ctrl_c().await?;
    info!("收到退出信号");
    Ok(())
}

/// 按优先级从低到高注册配置源
fn build_configuration(
    args: &Args,
    events: Arc<ConfigEventHandler>,
) -> anyhow::Result<CompositeConfiguration> {
    if !args.config.is_dir() {
        warn!("配置目录不存在: {}", args.config.display());
    }

    let switch_mappings = HashMap::from([
        ("-p".to_string(), "Server:Port".to_string()),
        ("--host".to_string(), "Server:Host".to_string()),
    ]);

    let config = ConfigurationBuilder::new()
        .set_base_path(&args.config)
        .with_event_handler(events)
        .add_json_file("appsettings.json", false, args.watch)
        .add_yaml_file(
            format!("appsettings.{}.yaml", args.environment),
            true,
            args.watch,
        )
        .add_environment_variables(Some(&args.env_prefix))
        .add_command_line(args.overrides.iter().cloned(), Some(switch_mappings))
        .build()
        .context("加载配置失败")?;

    Ok(config)
}
