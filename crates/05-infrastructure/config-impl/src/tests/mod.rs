//! 跨模块测试

mod hot_reload_tests;

use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// 初始化测试日志，`RUST_LOG` 控制输出级别
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// 轮询等待条件成立
pub(crate) fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    condition()
}
