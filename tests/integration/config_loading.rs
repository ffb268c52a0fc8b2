//! Integration tests for layered configuration loading

use super::test_utils::with_xdg_env;
use graphcache::config::{ClientConfig, ConfigLoader};
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_defaults_without_any_files() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();

    let config = with_xdg_env(&test_dir, |_| ConfigLoader::load(workspace.path()).unwrap());
    assert_eq!(config, ClientConfig::default());
}

#[test]
fn test_workspace_file_overrides_global_file() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();

    let config = with_xdg_env(&test_dir, |config_home| {
        let global_dir = config_home.join("graphcache");
        std::fs::create_dir_all(&global_dir).unwrap();
        std::fs::write(
            global_dir.join("config.toml"),
            r#"
[queue]
dequeue_on_error = true
replay_timeout_ms = 1000

[logging]
level = "warn"
"#,
        )
        .unwrap();
        std::fs::write(
            workspace.path().join("graphcache.toml"),
            r#"
[queue]
replay_timeout_ms = 5000

[storage]
cache_path = "state/cache"
"#,
        )
        .unwrap();

        ConfigLoader::load(workspace.path()).unwrap()
    });

    assert!(config.queue.dequeue_on_error, "global value survives");
    assert_eq!(config.queue.replay_timeout_ms, Some(5000), "workspace wins");
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.storage.cache_path, PathBuf::from("state/cache"));
    assert_eq!(config.storage.queue_path, PathBuf::from(".graphcache/queue"));
}

#[test]
fn test_environment_overrides_files() {
    let test_dir = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();

    let config = with_xdg_env(&test_dir, |_| {
        std::fs::write(
            workspace.path().join("graphcache.toml"),
            "[queue]\ndequeue_on_error = false\n",
        )
        .unwrap();
        std::env::set_var("GRAPHCACHE__QUEUE__DEQUEUE_ON_ERROR", "true");
        ConfigLoader::load(workspace.path())
    })
    .unwrap();

    assert!(config.queue.dequeue_on_error);
}

#[test]
fn test_load_from_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    let err = ConfigLoader::load_from_file(&dir.path().join("nope.toml")).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
}
