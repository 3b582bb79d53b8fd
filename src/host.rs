//! Host Surfaces
//!
//! The pieces of the surrounding editor this crate talks to: the document
//! buffer, the quick-pick UI, the notification area and code navigation.
//! Hosts implement the traits; the bridge binary ships headless versions.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use crate::features::code_link::CodeLink;

/// A diagram file as the host's document model sees it.
///
/// Text documents may be shared by several editors; the buffer is the single
/// source of truth for what was last read from or written to disk.
#[derive(Debug)]
pub struct HostDocument {
    path: PathBuf,
    content: Mutex<Vec<u8>>,
}

impl HostDocument {
    /// Read a document from disk. A missing file opens as an empty new document.
    pub async fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e),
        };
        Ok(Self::with_content(path, content))
    }

    pub fn with_content(path: impl Into<PathBuf>, content: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            content: Mutex::new(content),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn content(&self) -> Vec<u8> {
        self.content.lock().await.clone()
    }

    /// Write bytes to disk first, then adopt them as the buffer content
    pub async fn write(&self, bytes: Vec<u8>) -> std::io::Result<()> {
        write_file(&self.path, &bytes).await?;
        *self.content.lock().await = bytes;
        Ok(())
    }

    /// Re-read the file, replacing the buffer
    pub async fn reload(&self) -> std::io::Result<Vec<u8>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e),
        };
        *self.content.lock().await = bytes.clone();
        Ok(bytes)
    }
}

/// Write a file, creating its parent directories
pub(crate) async fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(path, bytes).await
}

/// One row of a quick pick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickPickItem {
    pub label: String,
    pub description: String,
}

impl QuickPickItem {
    pub fn new(label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: description.into(),
        }
    }
}

/// The host's picker. Resolves to the chosen index, or `None` when cancelled.
#[async_trait]
pub trait QuickPick: Send + Sync {
    /// `highlights`, when given, receives the index of every item the user
    /// moves onto before deciding.
    async fn pick(
        &self,
        items: Vec<QuickPickItem>,
        highlights: Option<mpsc::UnboundedSender<usize>>,
    ) -> Option<usize>;
}

/// The host's notification area
pub trait Notifier: Send + Sync {
    fn show_info(&self, message: &str);
    fn show_error(&self, message: &str);
}

/// Jump-to-code support used by the code link feature
#[async_trait]
pub trait CodeNavigator: Send + Sync {
    /// Reveal a linked location in a text editor
    async fn reveal(&self, link: &CodeLink) -> anyhow::Result<()>;

    /// The location under the cursor of the last focused text editor
    async fn current_position(&self) -> Option<CodeLink>;
}

/// Picker for hosts without UI: every pick is cancelled
#[derive(Debug, Default, Clone, Copy)]
pub struct NoQuickPick;

#[async_trait]
impl QuickPick for NoQuickPick {
    async fn pick(
        &self,
        _items: Vec<QuickPickItem>,
        _highlights: Option<mpsc::UnboundedSender<usize>>,
    ) -> Option<usize> {
        None
    }
}

/// Notifications routed to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show_info(&self, message: &str) {
        log::info!("{}", message);
    }

    fn show_error(&self, message: &str) {
        log::error!("{}", message);
    }
}

/// Navigation for hosts without text editors
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCodeNavigator;

#[async_trait]
impl CodeNavigator for NoCodeNavigator {
    async fn reveal(&self, link: &CodeLink) -> anyhow::Result<()> {
        log::info!("Code link selected: {}", link);
        Ok(())
    }

    async fn current_position(&self) -> Option<CodeLink> {
        None
    }
}
