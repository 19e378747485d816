use config_common::Configurable;
use config_macros::Configurable;

#[derive(Configurable)]
#[configurable(path = "Features:Search")]
struct SearchOptions {
    _enabled: bool,
}

#[derive(Configurable)]
struct MetricsOptions;

fn main() {
    assert_eq!(SearchOptions::get_config_path(), "Features:Search");
    assert_eq!(MetricsOptions::get_config_path(), "Metrics");
}
