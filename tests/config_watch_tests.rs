//! Settings file persistence and external edits
use std::sync::Arc;
use std::time::Duration;

use drawio_host::config::{Config, ConfigChange, Theme};
use tokio::fs;

#[tokio::test]
async fn test_updates_are_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.toml");

    let config = Config::with_settings_file(&path).expect("create config");
    config.set_theme(Theme::Kennedy).await.expect("set theme");
    config
        .set_code_link_activated(true)
        .await
        .expect("set code link");

    let reloaded = Config::with_settings_file(&path).expect("reload config");
    assert_eq!(reloaded.theme().await, Theme::Kennedy);
    assert!(reloaded.code_link_activated().await);
    assert!(fs::read_to_string(&path)
        .await
        .unwrap()
        .contains("theme = \"Kennedy\""));
}

#[tokio::test]
async fn test_reload_reports_external_changes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.toml");
    fs::write(&path, "theme = \"min\"\n").await.unwrap();

    let config = Config::with_settings_file(&path).expect("create config");
    assert_eq!(config.theme().await, Theme::Min);

    fs::write(&path, "theme = \"dark\"\nrequest_timeout_ms = 250\n")
        .await
        .unwrap();
    let changes = config.reload().await.expect("reload");
    assert_eq!(
        changes,
        vec![
            ConfigChange::Theme(Theme::Dark),
            ConfigChange::RequestTimeout(Duration::from_millis(250))
        ]
    );
    assert!(config.reload().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_settings_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.toml");
    fs::write(&path, "theme = 42\n").await.unwrap();

    assert!(Config::with_settings_file(&path).is_err());
}

#[tokio::test]
async fn test_watcher_picks_up_external_edit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.toml");
    fs::write(&path, "theme = \"automatic\"\n").await.unwrap();

    let config = Arc::new(Config::with_settings_file(&path).expect("create config"));
    let mut changes = config.subscribe();
    config.watch().await.expect("watch settings");

    // Give the watcher a moment to register
    tokio::time::sleep(Duration::from_millis(200)).await;
    fs::write(&path, "theme = \"atlas\"\n").await.unwrap();

    let change = tokio::time::timeout(Duration::from_secs(10), changes.recv())
        .await
        .expect("settings change not detected")
        .expect("change channel closed");
    assert_eq!(change, ConfigChange::Theme(Theme::Atlas));
    assert_eq!(config.theme().await, Theme::Atlas);
}
