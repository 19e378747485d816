//! 配置热重载测试

use super::{init_tracing, wait_until};
use crate::*;
use config_abstractions::ConfigChangeEventType;
use config_common::{on_change, ChangeToken, ChangeTokenSource, ConfigError};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 手动触发的文件监控器
#[derive(Default)]
struct ManualFileWatcher {
    tokens: ChangeTokenSource,
}

impl FileWatcher for ManualFileWatcher {
    fn watch(&self, _path: &Path) -> Result<Arc<dyn ChangeToken>, ConfigError> {
        Ok(self.tokens.token())
    }
}

fn watched_json(path: &Path, watcher: Arc<ManualFileWatcher>) -> FileConfigurationSource {
    FileConfigurationSource::new(path)
        .reload_on_change(true)
        .with_reload_delay(Duration::from_millis(20))
        .with_watcher(watcher)
}

#[test]
fn test_root_token_fires_on_file_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.json");
    fs::write(&path, r#"{ "Feature": { "Enabled": false } }"#).unwrap();

    let watcher = Arc::new(ManualFileWatcher::default());
    let config = ConfigurationBuilder::new()
        .add_file_source(watched_json(&path, watcher.clone()))
        .add_in_memory([("Other", "1")])
        .build()
        .unwrap();

    let token = config.get_reload_token();
    assert!(!token.has_changed());

    fs::write(&path, r#"{ "Feature": { "Enabled": true } }"#).unwrap();
    watcher.tokens.raise();

    assert!(wait_until(Duration::from_secs(5), || token.has_changed()));
    assert_eq!(config.get("Feature:Enabled").as_deref(), Some("true"));
    assert!(!config.get_reload_token().has_changed());
}

#[test]
fn test_on_change_rearms_across_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.json");
    fs::write(&path, r#"{ "Counter": 0 }"#).unwrap();

    let watcher = Arc::new(ManualFileWatcher::default());
    let config = ConfigurationBuilder::new()
        .add_file_source(watched_json(&path, watcher.clone()))
        .build()
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let producer = config.clone();
    let counter = calls.clone();
    let subscription = on_change(
        move || producer.get_reload_token(),
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        },
    );

    for round in 1..=3 {
        fs::write(&path, format!(r#"{{ "Counter": {round} }}"#)).unwrap();
        watcher.tokens.raise();
        assert!(wait_until(Duration::from_secs(5), || {
            calls.load(Ordering::SeqCst) >= round
        }));
    }
    assert_eq!(config.get("Counter").as_deref(), Some("3"));

    drop(subscription);
    fs::write(&path, r#"{ "Counter": 4 }"#).unwrap();
    watcher.tokens.raise();
    assert!(wait_until(Duration::from_secs(5), || {
        config.get("Counter").as_deref() == Some("4")
    }));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_failed_reload_keeps_previous_values() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.json");
    fs::write(&path, r#"{ "Name": "good" }"#).unwrap();

    let handler = Arc::new(ConfigEventHandler::new());
    let statistics = Arc::new(ReloadStatisticsListener::new());
    handler.register_listener(statistics.clone());

    let watcher = Arc::new(ManualFileWatcher::default());
    let config = ConfigurationBuilder::new()
        .with_event_handler(handler.clone())
        .add_file_source(watched_json(&path, watcher.clone()))
        .build()
        .unwrap();
    let token = config.get_reload_token();

    fs::write(&path, "{ broken").unwrap();
    watcher.tokens.raise();
    assert!(wait_until(Duration::from_secs(5), || {
        statistics.failure_count() == 1
    }));
    assert_eq!(config.get("Name").as_deref(), Some("good"));
    assert!(!token.has_changed());

    fs::write(&path, r#"{ "Name": "fixed" }"#).unwrap();
    watcher.tokens.raise();
    assert!(wait_until(Duration::from_secs(5), || {
        statistics.reload_count() == 1
    }));
    assert_eq!(config.get("Name").as_deref(), Some("fixed"));
    assert!(token.has_changed());
}

#[test]
fn test_burst_of_changes_reloads_once() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.json");
    fs::write(&path, r#"{ "Value": "0" }"#).unwrap();

    let handler = Arc::new(ConfigEventHandler::new());
    let mut events = handler.subscribe();
    let watcher = Arc::new(ManualFileWatcher::default());
    let config = ConfigurationBuilder::new()
        .with_event_handler(handler)
        .add_file_source(
            FileConfigurationSource::new(&path)
                .reload_on_change(true)
                .with_reload_delay(Duration::from_millis(300))
                .with_watcher(watcher.clone()),
        )
        .build()
        .unwrap();

    for value in 1..=5 {
        fs::write(&path, format!(r#"{{ "Value": "{value}" }}"#)).unwrap();
        watcher.tokens.raise();
        std::thread::sleep(Duration::from_millis(20));
    }

    assert!(wait_until(Duration::from_secs(5), || {
        config.get("Value").as_deref() == Some("5")
    }));
    std::thread::sleep(Duration::from_millis(600));

    let mut reloads = 0;
    while let Ok(event) = events.try_recv() {
        if event.event_type == ConfigChangeEventType::Reloaded {
            reloads += 1;
        }
    }
    assert_eq!(reloads, 1);
}

#[test]
fn test_explicit_reload_raises_token() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.toml");
    fs::write(&path, "Mode = \"a\"\n").unwrap();

    let config = ConfigurationBuilder::new()
        .add_toml_file(&path, false, false)
        .build()
        .unwrap();
    let token = config.get_reload_token();

    fs::write(&path, "Mode = \"b\"\n").unwrap();
    config.reload().unwrap();

    assert!(token.has_changed());
    assert_eq!(config.get("Mode").as_deref(), Some("b"));
}

#[test]
fn test_polling_watcher_detects_file_change() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("watched.yaml");
    fs::write(&path, "Level: low\n").unwrap();

    let config = ConfigurationBuilder::new()
        .add_file_source(
            FileConfigurationSource::new(&path)
                .reload_on_change(true)
                .with_reload_delay(Duration::from_millis(50))
                .with_watch_mode(WatchMode::Polling(Duration::from_millis(50))),
        )
        .build()
        .unwrap();
    assert_eq!(config.get("Level").as_deref(), Some("low"));

    std::thread::sleep(Duration::from_millis(200));
    fs::write(&path, "Level: high\n").unwrap();

    assert!(wait_until(Duration::from_secs(10), || {
        config.get("Level").as_deref() == Some("high")
    }));
}

#[tokio::test]
async fn test_wait_for_reload_token() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.json");
    fs::write(&path, r#"{ "A": 1 }"#).unwrap();

    let watcher = Arc::new(ManualFileWatcher::default());
    let config = ConfigurationBuilder::new()
        .add_file_source(watched_json(&path, watcher.clone()))
        .build()
        .unwrap();

    let token = config.get_reload_token();
    fs::write(&path, r#"{ "A": 2 }"#).unwrap();
    watcher.tokens.raise();

    tokio::time::timeout(Duration::from_secs(5), config_common::wait_for_change(token))
        .await
        .unwrap();
    assert_eq!(config.get("A").as_deref(), Some("2"));
}
