//! Commands
//!
//! User-facing commands. Each acts on the active diagram editor and does
//! nothing when there is none. Failures are reported through the host's
//! [`Notifier`]; a cancelled picker is not a failure.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;

use crate::codec::{DiagramFormat, ExportFormat};
use crate::config::{Config, Theme};
use crate::editor::{DrawioEditor, DrawioEditorManager};
use crate::features::LinkCodeWithSelectedNodeService;
use crate::host::{Notifier, QuickPick, QuickPickItem};

pub const CHANGE_THEME: &str = "drawio.changeTheme";
pub const CONVERT: &str = "drawio.convert";
pub const EXPORT: &str = "drawio.export";
pub const TOGGLE_CODE_LINK_ACTIVATION: &str = "drawio.toggleCodeLinkActivation";
pub const LINK_CODE_WITH_SELECTED_NODE: &str = "drawio.linkCodeWithSelectedNode";

/// Every command id, in registration order
pub const ALL: [&str; 5] = [
    CHANGE_THEME,
    CONVERT,
    EXPORT,
    TOGGLE_CODE_LINK_ACTIVATION,
    LINK_CODE_WITH_SELECTED_NODE,
];

pub struct Commands {
    config: Arc<Config>,
    manager: Arc<DrawioEditorManager>,
    code_link: Arc<LinkCodeWithSelectedNodeService>,
    quick_pick: Arc<dyn QuickPick>,
    notifier: Arc<dyn Notifier>,
}

impl Commands {
    pub fn new(
        config: Arc<Config>,
        manager: Arc<DrawioEditorManager>,
        code_link: Arc<LinkCodeWithSelectedNodeService>,
        quick_pick: Arc<dyn QuickPick>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            manager,
            code_link,
            quick_pick,
            notifier,
        }
    }

    /// Run a command by id, showing any failure to the user
    pub async fn execute(&self, command: &str) -> Result<()> {
        log::debug!("Executing {}", command);
        let result = match command {
            CHANGE_THEME => self.change_theme().await,
            CONVERT => self.convert().await,
            EXPORT => self.export().await,
            TOGGLE_CODE_LINK_ACTIVATION => self.toggle_code_link_activation().await,
            LINK_CODE_WITH_SELECTED_NODE => self.link_code_with_selected_node().await,
            _ => bail!("Unknown command: {}", command),
        };

        if let Err(e) = &result {
            self.notifier.show_error(&format!("{:#}", e));
        }
        result
    }

    /// Pick a theme with live preview.
    ///
    /// Every highlighted theme is shown in the active webview right away. Confirming
    /// stores the choice in the configuration; cancelling shows the editor's
    /// effective theme again.
    pub async fn change_theme(&self) -> Result<()> {
        let Some(editor) = self.active_editor().await else {
            return Ok(());
        };

        let current = editor.theme().await;
        let candidates = Theme::candidates(current);
        let items = candidates
            .iter()
            .map(|theme| {
                let description = if *theme == current { "current" } else { "" };
                QuickPickItem::new(theme.name(), description)
            })
            .collect();

        let (highlights, mut highlighted) = mpsc::unbounded_channel();
        let pick = self.quick_pick.pick(items, Some(highlights));
        tokio::pin!(pick);

        let choice = loop {
            tokio::select! {
                biased;
                Some(index) = highlighted.recv() => preview(&editor, candidates.get(index)).await,
                choice = &mut pick => break choice,
            }
        };
        // Highlights sent in the same poll that resolved the pick.
        while let Ok(index) = highlighted.try_recv() {
            preview(&editor, candidates.get(index)).await;
        }

        match choice.and_then(|index| candidates.get(index).copied()) {
            Some(theme) => {
                self.config
                    .set_theme(theme)
                    .await
                    .context("Failed to store theme")?;
                editor.set_theme_override(None).await?;
                log::info!("Theme changed to {}", theme);
            }
            None => {
                let theme = editor.theme().await;
                editor.show_theme(theme).await?;
                log::debug!("Theme change cancelled, restored {}", theme);
            }
        }
        Ok(())
    }

    /// Re-encode the active diagram into another diagram format
    pub async fn convert(&self) -> Result<()> {
        let Some(editor) = self.active_editor().await else {
            return Ok(());
        };

        let targets: Vec<DiagramFormat> = DiagramFormat::ALL
            .into_iter()
            .filter(|format| *format != editor.format())
            .collect();
        let items = targets
            .iter()
            .map(|format| QuickPickItem::new(format.extension(), format.description()))
            .collect();

        let Some(target) = self.pick(items, &targets).await else {
            return Ok(());
        };
        let path = editor
            .convert_to(target)
            .await
            .with_context(|| format!("Failed to convert {}", editor.path().display()))?;
        self.notifier
            .show_info(&format!("Converted to {}", path.display()));
        Ok(())
    }

    /// Write a rendered copy of the active diagram
    pub async fn export(&self) -> Result<()> {
        let Some(editor) = self.active_editor().await else {
            return Ok(());
        };

        let targets = ExportFormat::ALL;
        let items = targets
            .iter()
            .map(|format| QuickPickItem::new(format.extension(), format.description()))
            .collect();

        let Some(target) = self.pick(items, &targets).await else {
            return Ok(());
        };
        let path = editor
            .export_to(target)
            .await
            .with_context(|| format!("Failed to export {}", editor.path().display()))?;
        self.notifier
            .show_info(&format!("Exported to {}", path.display()));
        Ok(())
    }

    pub async fn toggle_code_link_activation(&self) -> Result<()> {
        let activated = self
            .code_link
            .toggle_activation()
            .await
            .context("Failed to store code link activation")?;
        self.notifier.show_info(if activated {
            "Code link activated"
        } else {
            "Code link deactivated"
        });
        Ok(())
    }

    pub async fn link_code_with_selected_node(&self) -> Result<()> {
        self.code_link
            .link_code_with_selected_node()
            .await
            .context("Failed to link code with the selected node")?;
        Ok(())
    }

    async fn active_editor(&self) -> Option<Arc<DrawioEditor>> {
        let editor = self.manager.active_drawio_editor().await;
        if editor.is_none() {
            log::debug!("No active diagram editor");
        }
        editor
    }

    async fn pick<T: Copy>(&self, items: Vec<QuickPickItem>, values: &[T]) -> Option<T> {
        let index = self.quick_pick.pick(items, None).await?;
        values.get(index).copied()
    }
}

async fn preview(editor: &DrawioEditor, theme: Option<&Theme>) {
    if let Some(theme) = theme {
        if let Err(e) = editor.show_theme(*theme).await {
            log::debug!("Theme preview failed: {}", e);
        }
    }
}
