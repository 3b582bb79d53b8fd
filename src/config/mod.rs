//! Configuration management for the draw.io host.
//!
//! Handles:
//! - Command-line argument parsing
//! - The persisted settings file (TOML, last write wins)
//! - Change notifications, including edits made to the file by other processes

pub mod theme;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, broadcast, mpsc};

use crate::error::ConfigError;

pub use theme::Theme;

/// Command-line arguments for the draw.io host
#[derive(Debug, Parser)]
#[command(name = "drawio-host")]
#[command(about = "Editor host for draw.io diagram files")]
#[command(version)]
pub struct Args {
    /// Settings file to use instead of the per-user one
    #[arg(long, help = "Path to the settings TOML file")]
    pub settings: Option<PathBuf>,

    /// Log level for the host
    #[arg(
        long,
        default_value = "info",
        help = "Log level (trace, debug, info, warn, error)"
    )]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Open a diagram and speak the webview protocol over stdin/stdout
    Serve { file: PathBuf },
    /// Print the diagram XML embedded in a file
    Extract { file: PathBuf },
    /// Check that a file survives an unedited open/save cycle byte for byte
    Check { file: PathBuf },
}

/// Persisted settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub theme: Theme,
    /// Keep webviews alive while their tab is hidden
    pub retain_context_when_hidden: bool,
    pub code_link_activated: bool,
    /// Upper bound for every webview round-trip
    pub request_timeout_ms: u64,
    /// Zero disables periodic backups
    pub backup_interval_secs: u64,
    pub backup_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::Automatic,
            retain_context_when_hidden: true,
            code_link_activated: false,
            request_timeout_ms: 5_000,
            backup_interval_secs: 30,
            backup_dir: None,
        }
    }
}

/// A single key that changed value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigChange {
    Theme(Theme),
    RetainContextWhenHidden(bool),
    CodeLinkActivated(bool),
    RequestTimeout(Duration),
    BackupInterval(Duration),
    BackupDir(Option<PathBuf>),
}

impl Settings {
    /// Keys whose value differs in `next`, carrying the new value
    pub fn diff(&self, next: &Settings) -> Vec<ConfigChange> {
        let mut changes = Vec::new();
        if self.theme != next.theme {
            changes.push(ConfigChange::Theme(next.theme));
        }
        if self.retain_context_when_hidden != next.retain_context_when_hidden {
            changes.push(ConfigChange::RetainContextWhenHidden(
                next.retain_context_when_hidden,
            ));
        }
        if self.code_link_activated != next.code_link_activated {
            changes.push(ConfigChange::CodeLinkActivated(next.code_link_activated));
        }
        if self.request_timeout_ms != next.request_timeout_ms {
            changes.push(ConfigChange::RequestTimeout(Duration::from_millis(
                next.request_timeout_ms,
            )));
        }
        if self.backup_interval_secs != next.backup_interval_secs {
            changes.push(ConfigChange::BackupInterval(Duration::from_secs(
                next.backup_interval_secs,
            )));
        }
        if self.backup_dir != next.backup_dir {
            changes.push(ConfigChange::BackupDir(next.backup_dir.clone()));
        }
        changes
    }
}

#[derive(Debug)]
enum WatcherEvent {
    SettingsFileChanged,
    WatcherError(notify::Error),
}

/// Combined configuration: launch options plus the live settings store
pub struct Config {
    /// Log level
    pub log_level: String,
    settings_path: Option<PathBuf>,
    settings: RwLock<Settings>,
    changes: broadcast::Sender<ConfigChange>,
    _watcher: Mutex<Option<RecommendedWatcher>>,
}

impl Config {
    /// Create configuration from the process command line
    pub fn from_args_and_env() -> Result<(Self, Command)> {
        let args = Args::parse();
        let config = Self::from_args(&args)?;
        Ok((config, args.command))
    }

    /// Create configuration from explicit arguments (useful for testing)
    pub fn from_args(args: &Args) -> Result<Self> {
        let settings_path = args.settings.clone().or_else(|| {
            dirs::config_dir().map(|dir| dir.join("drawio-host").join("settings.toml"))
        });

        let settings = match &settings_path {
            Some(path) if path.exists() => load_settings(path)?,
            _ => Settings::default(),
        };

        let mut config = Self::new(settings, settings_path);
        config.log_level = args.log_level.clone();
        Ok(config)
    }

    /// In-memory configuration that is never persisted
    pub fn with_settings(settings: Settings) -> Self {
        Self::new(settings, None)
    }

    /// Configuration backed by a specific settings file
    pub fn with_settings_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let settings = if path.exists() {
            load_settings(&path)?
        } else {
            Settings::default()
        };
        Ok(Self::new(settings, Some(path)))
    }

    fn new(settings: Settings, settings_path: Option<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            log_level: "info".to_string(),
            settings_path,
            settings: RwLock::new(settings),
            changes,
            _watcher: Mutex::new(None),
        }
    }

    pub fn settings_path(&self) -> Option<&Path> {
        self.settings_path.as_deref()
    }

    /// Snapshot of all settings
    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    pub async fn theme(&self) -> Theme {
        self.settings.read().await.theme
    }

    pub async fn set_theme(&self, theme: Theme) -> Result<(), ConfigError> {
        self.update(|s| s.theme = theme).await.map(|_| ())
    }

    pub async fn retain_context_when_hidden(&self) -> bool {
        self.settings.read().await.retain_context_when_hidden
    }

    pub async fn code_link_activated(&self) -> bool {
        self.settings.read().await.code_link_activated
    }

    pub async fn set_code_link_activated(&self, activated: bool) -> Result<(), ConfigError> {
        self.update(|s| s.code_link_activated = activated)
            .await
            .map(|_| ())
    }

    pub async fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.read().await.request_timeout_ms)
    }

    pub async fn backup_interval(&self) -> Option<Duration> {
        match self.settings.read().await.backup_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Where backups go: the configured directory, else the user cache directory
    pub async fn backup_dir(&self) -> PathBuf {
        self.settings
            .read()
            .await
            .backup_dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|dir| dir.join("drawio-host").join("backups")))
            .unwrap_or_else(|| std::env::temp_dir().join("drawio-host-backups"))
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.changes.subscribe()
    }

    /// Apply an edit, persist it, then notify subscribers of every changed key.
    ///
    /// Nothing is written or announced when the edit changes nothing.
    pub async fn update(
        &self,
        edit: impl FnOnce(&mut Settings),
    ) -> Result<Vec<ConfigChange>, ConfigError> {
        let changes = {
            let mut settings = self.settings.write().await;
            let mut next = settings.clone();
            edit(&mut next);

            let changes = settings.diff(&next);
            if changes.is_empty() {
                return Ok(changes);
            }
            if let Some(path) = &self.settings_path {
                save_settings(path, &next).await?;
            }
            *settings = next;
            changes
        };

        self.announce(&changes);
        Ok(changes)
    }

    /// Re-read the settings file and notify subscribers of keys that changed on disk
    pub async fn reload(&self) -> Result<Vec<ConfigChange>, ConfigError> {
        let Some(path) = &self.settings_path else {
            return Ok(Vec::new());
        };

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.clone(),
                    source,
                })
            }
        };
        let loaded = parse_settings(path, &content)?;

        let changes = {
            let mut settings = self.settings.write().await;
            let changes = settings.diff(&loaded);
            *settings = loaded;
            changes
        };

        self.announce(&changes);
        Ok(changes)
    }

    /// Start watching the settings file for external edits
    pub async fn watch(self: &Arc<Self>) -> Result<(), ConfigError> {
        let Some(path) = self.settings_path.clone() else {
            return Ok(());
        };
        let Some(dir) = path.parent().filter(|dir| dir.is_dir()) else {
            log::debug!(
                "Settings directory for {} does not exist, not watching",
                path.display()
            );
            return Ok(());
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let file_name = path.file_name().map(|name| name.to_os_string());

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if let EventKind::Create(_) | EventKind::Modify(_) = event.kind {
                        if event
                            .paths
                            .iter()
                            .any(|p| p.file_name() == file_name.as_deref())
                        {
                            let _ = tx.send(WatcherEvent::SettingsFileChanged);
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(WatcherEvent::WatcherError(e));
                }
            },
            notify::Config::default().with_poll_interval(Duration::from_secs(1)),
        )?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        *self._watcher.lock().await = Some(watcher);

        tokio::spawn(Self::process_watcher_events(Arc::downgrade(self), rx));
        Ok(())
    }

    async fn process_watcher_events(
        config: Weak<Config>,
        mut rx: mpsc::UnboundedReceiver<WatcherEvent>,
    ) {
        while let Some(event) = rx.recv().await {
            let Some(config) = config.upgrade() else {
                break;
            };
            match event {
                WatcherEvent::SettingsFileChanged => match config.reload().await {
                    Ok(changes) if !changes.is_empty() => {
                        log::info!("Settings reloaded, {} key(s) changed", changes.len());
                    }
                    Ok(_) => {}
                    Err(e) => log::warn!("Failed to reload settings: {}", e),
                },
                WatcherEvent::WatcherError(e) => {
                    log::error!("Settings file watcher error: {}", e);
                }
            }
        }
    }

    fn announce(&self, changes: &[ConfigChange]) {
        for change in changes {
            // No receivers is fine.
            let _ = self.changes.send(change.clone());
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::with_settings(Settings::default())
    }
}

/// Load settings from a TOML file
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_settings(path, &content)
}

fn parse_settings(path: &Path, content: &str) -> Result<Settings, ConfigError> {
    toml::from_str(content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

async fn save_settings(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(settings)?;
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
    }
    tokio::fs::write(path, content)
        .await
        .map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
}
