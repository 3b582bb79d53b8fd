//! Code Links
//!
//! A node label can point into source code, either at a symbol (`#Symbol`) or
//! at a line of a file (`src/main.rs:42`). With code linking activated,
//! selecting such a node reveals the location in the host's text editor.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;

use super::ActiveEditorObserver;
use crate::config::Config;
use crate::editor::{DrawioEditor, DrawioEditorManager, EditorEvent};
use crate::error::{ConfigError, EditorError};
use crate::host::CodeNavigator;
use crate::webview::protocol::HostMessage;

static POSITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<path>[^\s:#][^\s]*?):(?P<line>[1-9][0-9]*)$").expect("position pattern")
});

static SYMBOL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#(?P<symbol>[A-Za-z_$][\w$.:]*)$").expect("symbol pattern"));

/// A location in source code referenced from a diagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeLink {
    Symbol(String),
    /// 1-based line
    Position { path: PathBuf, line: u32 },
}

impl CodeLink {
    /// Parse a node label; `None` if the label is not a code link
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        if let Some(captures) = SYMBOL.captures(label) {
            return Some(Self::Symbol(captures["symbol"].to_string()));
        }
        let captures = POSITION.captures(label)?;
        Some(Self::Position {
            path: PathBuf::from(&captures["path"]),
            line: captures["line"].parse().ok()?,
        })
    }
}

impl fmt::Display for CodeLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Symbol(symbol) => write!(f, "#{}", symbol),
            Self::Position { path, line } => write!(f, "{}:{}", path.display(), line),
        }
    }
}

impl FromStr for CodeLink {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("not a code link: {:?}", s))
    }
}

/// Jumps from selected nodes to code, and labels nodes with the current code position
pub struct LinkCodeWithSelectedNodeService {
    config: Arc<Config>,
    manager: Arc<DrawioEditorManager>,
    navigator: Arc<dyn CodeNavigator>,
}

impl LinkCodeWithSelectedNodeService {
    pub fn new(
        config: Arc<Config>,
        manager: Arc<DrawioEditorManager>,
        navigator: Arc<dyn CodeNavigator>,
    ) -> Self {
        Self {
            config,
            manager,
            navigator,
        }
    }

    pub async fn is_activated(&self) -> bool {
        self.config.code_link_activated().await
    }

    /// Flip activation and return the new state
    pub async fn toggle_activation(&self) -> Result<bool, ConfigError> {
        let activated = !self.config.code_link_activated().await;
        self.config.set_code_link_activated(activated).await?;
        log::info!(
            "Code link {}",
            if activated { "activated" } else { "deactivated" }
        );
        Ok(activated)
    }

    /// Label the active editor's selected node with the host's cursor position.
    ///
    /// Returns the link that was sent, or `None` without an active editor or a
    /// known position.
    pub async fn link_code_with_selected_node(&self) -> Result<Option<CodeLink>, EditorError> {
        let Some(editor) = self.manager.active_drawio_editor().await else {
            return Ok(None);
        };
        let Some(link) = self.navigator.current_position().await else {
            log::debug!("No code position to link");
            return Ok(None);
        };

        editor
            .webview()
            .send(HostMessage::LinkSelectedNode {
                label: link.to_string(),
            })
            .await?;
        Ok(Some(link))
    }

    /// Reveal the code behind a selected node, if linking is active
    pub async fn node_selected(&self, label: Option<&str>) -> anyhow::Result<()> {
        if !self.is_activated().await {
            return Ok(());
        }
        let Some(link) = label.and_then(CodeLink::parse) else {
            return Ok(());
        };
        self.navigator.reveal(&link).await
    }
}

#[async_trait]
impl ActiveEditorObserver for LinkCodeWithSelectedNodeService {
    async fn active_editor_changed(&self, _editor: Option<Arc<DrawioEditor>>) {}

    async fn editor_event(&self, _editor: &Arc<DrawioEditor>, event: EditorEvent) {
        if let EditorEvent::NodeSelected(label) = event {
            if let Err(e) = self.node_selected(label.as_deref()).await {
                log::warn!("Failed to reveal code link: {}", e);
            }
        }
    }
}
