//! Extension Activation
//!
//! Wires the providers, the editor manager, the feature services and the
//! commands together, and owns the background tasks that keep them running.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use crate::codec::DiagramFormat;
use crate::commands::Commands;
use crate::config::{Config, ConfigChange};
use crate::editor::{
    DrawioEditor, DrawioEditorManager, DrawioEditorProviderBinary, DrawioEditorProviderText,
    EditorEvent, EditorId,
};
use crate::error::{EditorError, WebviewError};
use crate::features::{EditDiagramAsTextService, LinkCodeWithSelectedNodeService, spawn_observer};
use crate::host::{CodeNavigator, LogNotifier, NoCodeNavigator, NoQuickPick, Notifier, QuickPick};
use crate::webview::{DrawioWebviewInitializer, WebviewHandle};

/// The host surfaces the extension talks to
#[derive(Clone)]
pub struct HostServices {
    pub quick_pick: Arc<dyn QuickPick>,
    pub notifier: Arc<dyn Notifier>,
    pub navigator: Arc<dyn CodeNavigator>,
}

impl Default for HostServices {
    /// Headless services: pickers cancel, notifications go to the log
    fn default() -> Self {
        Self {
            quick_pick: Arc::new(NoQuickPick),
            notifier: Arc::new(LogNotifier),
            navigator: Arc::new(NoCodeNavigator),
        }
    }
}

pub struct Extension {
    config: Arc<Config>,
    manager: Arc<DrawioEditorManager>,
    text: Arc<DrawioEditorProviderText>,
    binary: Arc<DrawioEditorProviderBinary>,
    code_link: Arc<LinkCodeWithSelectedNodeService>,
    text_view: Arc<EditDiagramAsTextService>,
    commands: Commands,
    notifier: Arc<dyn Notifier>,
    tasks: Vec<JoinHandle<()>>,
}

impl Extension {
    /// Register providers, start the settings watcher and the background tasks
    pub async fn activate(config: Arc<Config>, services: HostServices) -> Result<Self> {
        config
            .watch()
            .await
            .context("Failed to watch the settings file")?;

        let manager = Arc::new(DrawioEditorManager::new());
        let initializer = Arc::new(DrawioWebviewInitializer::new(config.clone()));
        let text = Arc::new(DrawioEditorProviderText::new(
            initializer.clone(),
            manager.clone(),
        ));
        let binary = Arc::new(DrawioEditorProviderBinary::new(
            initializer,
            manager.clone(),
        ));

        let code_link = Arc::new(LinkCodeWithSelectedNodeService::new(
            config.clone(),
            manager.clone(),
            services.navigator.clone(),
        ));
        let text_view = Arc::new(EditDiagramAsTextService::new(manager.clone()));
        let commands = Commands::new(
            config.clone(),
            manager.clone(),
            code_link.clone(),
            services.quick_pick.clone(),
            services.notifier.clone(),
        );

        let tasks = vec![
            spawn_observer(manager.clone(), code_link.clone()),
            spawn_observer(manager.clone(), text_view.clone()),
            tokio::spawn(run_backups(config.clone(), text.clone(), binary.clone())),
        ];

        log::info!(
            "Registered {} and {} editors",
            text.view_type(),
            binary.view_type()
        );
        Ok(Self {
            config,
            manager,
            text,
            binary,
            code_link,
            text_view,
            commands,
            notifier: services.notifier,
            tasks,
        })
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn manager(&self) -> &Arc<DrawioEditorManager> {
        &self.manager
    }

    pub fn text_provider(&self) -> &Arc<DrawioEditorProviderText> {
        &self.text
    }

    pub fn binary_provider(&self) -> &Arc<DrawioEditorProviderBinary> {
        &self.binary
    }

    pub fn code_link(&self) -> &Arc<LinkCodeWithSelectedNodeService> {
        &self.code_link
    }

    pub fn text_view(&self) -> &Arc<EditDiagramAsTextService> {
        &self.text_view
    }

    /// Open `path` with the provider registered for its format
    pub async fn open(
        &self,
        path: impl AsRef<Path>,
        webview: WebviewHandle,
    ) -> Result<Arc<DrawioEditor>, EditorError> {
        let path = path.as_ref();
        let editor = match DiagramFormat::from_path(path) {
            Some(format) if format.is_binary() => self.binary.open(path, webview).await?,
            Some(_) => self.text.open(path, webview).await?,
            None => return Err(EditorError::UnsupportedFile(path.to_path_buf())),
        };

        self.spawn_save_requests(&editor);
        Ok(editor)
    }

    /// Save an editor's document, reporting failures to the user
    pub async fn save(&self, id: EditorId) -> Result<(), EditorError> {
        let result = save_with(&self.text, &self.binary, id).await;
        report(self.notifier.as_ref(), "save", result)
    }

    pub async fn save_as(&self, id: EditorId, destination: &Path) -> Result<(), EditorError> {
        let result = if self.binary.editor(id).await.is_some() {
            self.binary.save_as(id, destination).await
        } else {
            self.text.save_as(id, destination).await
        };
        report(self.notifier.as_ref(), "save", result)
    }

    pub async fn revert(&self, id: EditorId) -> Result<(), EditorError> {
        let result = if self.binary.editor(id).await.is_some() {
            self.binary.revert(id).await
        } else {
            self.text.revert(id).await
        };
        report(self.notifier.as_ref(), "revert", result)
    }

    /// Back up every dirty editor now
    pub async fn backup_dirty(&self) -> Vec<PathBuf> {
        backup_dirty(&self.config, &self.text, &self.binary).await
    }

    /// Host focus transition for an editor's panel
    pub async fn set_focus(&self, id: EditorId, focused: bool) {
        self.manager.set_focus(id, focused).await;
    }

    pub async fn execute_command(&self, command: &str) -> Result<()> {
        self.commands.execute(command).await
    }

    /// A `save` from the webview saves the document like the host's save action
    fn spawn_save_requests(&self, editor: &Arc<DrawioEditor>) {
        let mut events = editor.subscribe();
        let id = editor.id();
        let text = self.text.clone();
        let binary = self.binary.clone();
        let notifier = self.notifier.clone();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(EditorEvent::SaveRequested) => {
                        let result = save_with(&text, &binary, id).await;
                        let _ = report(notifier.as_ref(), "save", result);
                    }
                    Ok(EditorEvent::Closed) | Err(RecvError::Closed) => break,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        log::debug!("Editor {} dropped {} events", id, skipped);
                    }
                }
            }
        });
    }
}

impl Drop for Extension {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn save_with(
    text: &DrawioEditorProviderText,
    binary: &DrawioEditorProviderBinary,
    id: EditorId,
) -> Result<(), EditorError> {
    if binary.editor(id).await.is_some() {
        binary.save(id).await
    } else {
        text.save(id).await
    }
}

/// Show a failed operation to the user. Closing mid-operation is not a failure.
fn report(
    notifier: &dyn Notifier,
    operation: &str,
    result: Result<(), EditorError>,
) -> Result<(), EditorError> {
    match &result {
        Err(EditorError::Closed(id)) => {
            log::debug!("Editor {} closed during {}", id, operation);
        }
        Err(EditorError::Webview(WebviewError::Closed)) => {
            log::debug!("Webview closed during {}", operation);
        }
        Err(e) => notifier.show_error(&format!("Failed to {}: {}", operation, e)),
        Ok(()) => {}
    }
    result
}

async fn backup_dirty(
    config: &Config,
    text: &DrawioEditorProviderText,
    binary: &DrawioEditorProviderBinary,
) -> Vec<PathBuf> {
    let dir = config.backup_dir().await;
    let mut written = Vec::new();

    for editor in text.dirty_editors().await {
        match text.backup(editor.id(), &dir).await {
            Ok(path) => written.push(path),
            Err(e) => log::debug!("Skipped backup of editor {}: {}", editor.id(), e),
        }
    }
    for editor in binary.dirty_editors().await {
        match binary.backup(editor.id(), &dir).await {
            Ok(path) => written.push(path),
            Err(e) => log::debug!("Skipped backup of editor {}: {}", editor.id(), e),
        }
    }
    written
}

async fn run_backups(
    config: Arc<Config>,
    text: Arc<DrawioEditorProviderText>,
    binary: Arc<DrawioEditorProviderBinary>,
) {
    let mut changes = config.subscribe();
    let mut interval = config.backup_interval().await;
    let mut deadline = interval.map(|interval| Instant::now() + interval);

    loop {
        let tick = async move {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = tick => {
                let written = backup_dirty(&config, &text, &binary).await;
                if !written.is_empty() {
                    log::debug!("Backed up {} editor(s)", written.len());
                }
                deadline = interval.map(|interval| Instant::now() + interval);
            }
            change = changes.recv() => match change {
                Ok(ConfigChange::BackupInterval(_)) | Err(RecvError::Lagged(_)) => {
                    interval = config.backup_interval().await;
                    deadline = interval.map(|interval| Instant::now() + interval);
                }
                Ok(_) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }
}
