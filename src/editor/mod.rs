//! Diagram Editors
//!
//! A [`DrawioEditor`] binds one host document to one webview. Its diagram state
//! only changes when the webview confirms it; the host never edits optimistically.

pub mod manager;
pub mod provider;

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, broadcast, watch};

use crate::codec::{DiagramFormat, ExportFormat};
use crate::config::{Config, Theme};
use crate::error::{EditorError, WebviewError};
use crate::host::{HostDocument, write_file};
use crate::webview::connection::WebviewConnection;
use crate::webview::protocol::{HostMessage, Reply, WebviewMessage, payload_bytes};

pub use manager::{ActiveEditorChanged, DrawioEditorManager};
pub use provider::{
    BinaryDocuments, DocumentKind, DrawioEditorProvider, DrawioEditorProviderBinary,
    DrawioEditorProviderText, TextDocuments,
};

static NEXT_EDITOR_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of an editor, unique for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EditorId(u64);

impl EditorId {
    pub(crate) fn next() -> Self {
        Self(NEXT_EDITOR_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EditorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// `Opening → Ready → (Modified ⇄ Saved) → Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Waiting for the webview's ready signal
    Opening,
    Ready,
    Modified,
    Saved,
    Closed,
}

/// The webview round-trip an editor is currently waiting on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingOperation {
    None,
    Saving,
    BackingUp,
    Converting,
    Exporting,
}

impl PendingOperation {
    fn name(self) -> &'static str {
        match self {
            Self::None => "idle",
            Self::Saving => "saving",
            Self::BackingUp => "backing up",
            Self::Converting => "converting",
            Self::Exporting => "exporting",
        }
    }
}

/// Things an editor reports to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    Ready,
    /// The webview confirmed a new diagram state
    ContentChanged,
    /// The user asked the embedded tool to save
    SaveRequested,
    NodeSelected(Option<String>),
    Closed,
}

struct EditorState {
    lifecycle: Lifecycle,
    /// Latest diagram XML confirmed by the webview
    current: String,
    /// Diagram XML as last read from or written to the document
    saved: String,
    theme_override: Option<Theme>,
    pending: PendingOperation,
}

/// One open diagram document bound to one webview
pub struct DrawioEditor {
    id: EditorId,
    view_type: &'static str,
    format: DiagramFormat,
    document: Arc<HostDocument>,
    config: Arc<Config>,
    webview: WebviewConnection,
    state: Mutex<EditorState>,
    events: broadcast::Sender<EditorEvent>,
    closed: watch::Sender<bool>,
}

impl fmt::Debug for DrawioEditor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawioEditor")
            .field("id", &self.id)
            .field("view_type", &self.view_type)
            .field("path", &self.document.path())
            .finish_non_exhaustive()
    }
}

impl DrawioEditor {
    pub(crate) fn new(
        view_type: &'static str,
        format: DiagramFormat,
        document: Arc<HostDocument>,
        config: Arc<Config>,
        diagram: String,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        let (closed, _) = watch::channel(false);

        Arc::new(Self {
            id: EditorId::next(),
            view_type,
            format,
            document,
            config,
            webview: WebviewConnection::new(),
            state: Mutex::new(EditorState {
                lifecycle: Lifecycle::Opening,
                current: diagram.clone(),
                saved: diagram,
                theme_override: None,
                pending: PendingOperation::None,
            }),
            events,
            closed,
        })
    }

    pub fn id(&self) -> EditorId {
        self.id
    }

    pub fn view_type(&self) -> &'static str {
        self.view_type
    }

    pub fn format(&self) -> DiagramFormat {
        self.format
    }

    pub fn path(&self) -> &Path {
        self.document.path()
    }

    pub fn document(&self) -> &Arc<HostDocument> {
        &self.document
    }

    pub(crate) fn webview(&self) -> &WebviewConnection {
        &self.webview
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EditorEvent> {
        self.events.subscribe()
    }

    pub async fn lifecycle(&self) -> Lifecycle {
        self.state.lock().await.lifecycle
    }

    pub async fn is_dirty(&self) -> bool {
        let state = self.state.lock().await;
        state.current != state.saved
    }

    /// Latest diagram XML confirmed by the webview
    pub async fn current_diagram(&self) -> String {
        self.state.lock().await.current.clone()
    }

    pub async fn pending_operation(&self) -> PendingOperation {
        self.state.lock().await.pending
    }

    /// The editor's own theme if set, else the configured one
    pub async fn theme(&self) -> Theme {
        let theme_override = self.state.lock().await.theme_override;
        match theme_override {
            Some(theme) => theme,
            None => self.config.theme().await,
        }
    }

    /// Pin a theme for this editor, or `None` to follow the configuration again
    pub async fn set_theme_override(&self, theme: Option<Theme>) -> Result<(), EditorError> {
        self.state.lock().await.theme_override = theme;
        let effective = self.theme().await;
        self.show_theme(effective).await
    }

    /// Push a theme to the webview without recording it anywhere
    pub async fn show_theme(&self, theme: Theme) -> Result<(), EditorError> {
        self.webview.send(HostMessage::SetTheme { theme }).await?;
        Ok(())
    }

    pub(crate) async fn follow_config_theme(&self, theme: Theme) {
        if self.state.lock().await.theme_override.is_some() {
            return;
        }
        if let Err(e) = self.show_theme(theme).await {
            log::debug!("Editor {} did not take theme {}: {}", self.id, theme, e);
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the webview is gone
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Ask the webview for its current diagram XML
    pub async fn request_content(&self) -> Result<String, EditorError> {
        let timeout = self.config.request_timeout().await;
        let content = self
            .webview
            .request(|request_id| HostMessage::GetContent { request_id }, timeout)
            .await?
            .into_content()?;
        Ok(content)
    }

    /// Ask the webview for the diagram encoded as `format`
    pub async fn render(&self, format: DiagramFormat) -> Result<Vec<u8>, EditorError> {
        let timeout = self.config.request_timeout().await;
        let rendered = self
            .webview
            .request(
                |request_id| HostMessage::Convert { request_id, format },
                timeout,
            )
            .await?
            .into_convert()?;
        Ok(payload_bytes(&rendered)?)
    }

    /// Re-encode the open diagram as `target` and write it next to this document.
    ///
    /// The current diagram XML is embedded into the result, so the new file decodes
    /// to exactly what this editor holds.
    pub async fn convert_to(&self, target: DiagramFormat) -> Result<PathBuf, EditorError> {
        if target == self.format {
            return Err(EditorError::SameFormat(target.extension()));
        }

        self.run_exclusive(PendingOperation::Converting, async {
            let diagram = self.request_content().await?;
            let container = self.render(target).await?;
            let bytes = target.encode(&container, &diagram)?;

            let path = self.format.sibling_path(self.path(), target.extension());
            self.write_output(&path, &bytes).await?;
            log::info!("Converted {} to {}", self.path().display(), path.display());
            Ok(path)
        })
        .await
    }

    /// Write a rendered export next to this document; the open document is untouched
    pub async fn export_to(&self, target: ExportFormat) -> Result<PathBuf, EditorError> {
        self.run_exclusive(PendingOperation::Exporting, async {
            let timeout = self.config.request_timeout().await;
            let exported = self
                .webview
                .request(
                    |request_id| HostMessage::Export {
                        request_id,
                        format: target,
                    },
                    timeout,
                )
                .await?
                .into_export()?;
            let bytes = payload_bytes(&exported)?;

            let path = self.format.sibling_path(self.path(), target.extension());
            self.write_output(&path, &bytes).await?;
            log::info!("Exported {} to {}", self.path().display(), path.display());
            Ok(path)
        })
        .await
    }

    /// Replace the diagram in the webview with `diagram` and adopt whatever the
    /// webview confirms afterwards.
    pub async fn apply_edit(&self, diagram: String) -> Result<(), EditorError> {
        let theme = self.theme().await;
        self.webview
            .send(HostMessage::Load {
                content: diagram,
                theme,
            })
            .await?;
        let confirmed = self.request_content().await?;
        self.apply_content_change(confirmed).await;
        Ok(())
    }

    /// Full reload from document content; the result counts as saved
    pub(crate) async fn reload(&self, diagram: String) -> Result<(), EditorError> {
        {
            let mut state = self.state.lock().await;
            if state.lifecycle == Lifecycle::Closed {
                return Err(EditorError::Closed(self.id));
            }
            state.current = diagram.clone();
            state.saved = diagram.clone();
            if state.lifecycle != Lifecycle::Opening {
                state.lifecycle = Lifecycle::Ready;
            }
        }

        let theme = self.theme().await;
        self.webview
            .send(HostMessage::Load {
                content: diagram,
                theme,
            })
            .await?;
        let _ = self.events.send(EditorEvent::ContentChanged);
        Ok(())
    }

    /// Record that `diagram` now is what the document holds
    ///
    /// `diagram` is what the webview confirmed, so it also becomes the current
    /// content.
    pub(crate) async fn mark_saved(&self, diagram: String) {
        let changed = {
            let mut state = self.state.lock().await;
            if state.lifecycle == Lifecycle::Closed {
                return;
            }
            let changed = state.current != diagram;
            state.current = diagram.clone();
            state.saved = diagram;
            state.lifecycle = Lifecycle::Saved;
            changed
        };
        if changed {
            let _ = self.events.send(EditorEvent::ContentChanged);
        }
    }

    /// Another editor wrote `diagram` to the shared document; keep local edits
    pub(crate) async fn rebase_saved(&self, diagram: String) {
        let mut state = self.state.lock().await;
        if state.lifecycle == Lifecycle::Closed {
            return;
        }
        state.saved = diagram;
        state.lifecycle = if state.current == state.saved {
            Lifecycle::Saved
        } else {
            Lifecycle::Modified
        };
    }

    /// Run `operation` unless another round-trip is already in flight
    pub(crate) async fn run_exclusive<T>(
        &self,
        operation: PendingOperation,
        body: impl Future<Output = Result<T, EditorError>>,
    ) -> Result<T, EditorError> {
        {
            let mut state = self.state.lock().await;
            if state.lifecycle == Lifecycle::Closed {
                return Err(EditorError::Closed(self.id));
            }
            if state.pending != PendingOperation::None {
                return Err(EditorError::Busy {
                    id: self.id,
                    operation: state.pending.name(),
                });
            }
            state.pending = operation;
        }

        let result = body.await;
        self.state.lock().await.pending = PendingOperation::None;
        result
    }

    /// Handle one message from the webview, in arrival order
    pub(crate) async fn handle_message(&self, message: WebviewMessage) {
        match message {
            WebviewMessage::Ready => self.handle_ready().await,
            WebviewMessage::Autosave { content } => {
                self.apply_content_change(content).await;
            }
            WebviewMessage::Save { content } => {
                self.apply_content_change(content).await;
                let _ = self.events.send(EditorEvent::SaveRequested);
            }
            WebviewMessage::Content {
                request_id,
                content,
            } => self.resolve(request_id, Ok(Reply::Content(content))).await,
            WebviewMessage::ExportResult {
                request_id,
                content,
            } => {
                self.resolve(request_id, Ok(Reply::ExportResult(content)))
                    .await
            }
            WebviewMessage::ConvertResult {
                request_id,
                content,
            } => {
                self.resolve(request_id, Ok(Reply::ConvertResult(content)))
                    .await
            }
            WebviewMessage::NodeSelected { label } => {
                let _ = self.events.send(EditorEvent::NodeSelected(label));
            }
            WebviewMessage::Error {
                request_id: Some(request_id),
                message,
            } => {
                self.resolve(request_id, Err(WebviewError::Remote(message)))
                    .await
            }
            WebviewMessage::Error {
                request_id: None,
                message,
            } => log::warn!("Webview of editor {} reported: {}", self.id, message),
        }
    }

    async fn handle_ready(&self) {
        let first = self.webview.mark_ready().await;
        if !first {
            // The webview lost its state; give it the diagram again.
            log::info!("Webview of editor {} reloaded", self.id);
            let (diagram, theme) = (self.current_diagram().await, self.theme().await);
            let options = crate::webview::initializer::webview_options(&self.config).await;
            let _ = self.webview.send(HostMessage::Init { options }).await;
            let _ = self
                .webview
                .send(HostMessage::Load {
                    content: diagram,
                    theme,
                })
                .await;
        }

        {
            let mut state = self.state.lock().await;
            if state.lifecycle == Lifecycle::Opening {
                state.lifecycle = Lifecycle::Ready;
            }
        }
        let _ = self.events.send(EditorEvent::Ready);
    }

    async fn resolve(&self, request_id: u64, result: Result<Reply, WebviewError>) {
        if !self.webview.resolve(request_id, result).await {
            log::debug!(
                "Discarding stale response {} for editor {}",
                request_id,
                self.id
            );
        }
    }

    async fn apply_content_change(&self, content: String) {
        let changed = {
            let mut state = self.state.lock().await;
            if state.lifecycle == Lifecycle::Closed || state.current == content {
                false
            } else {
                state.current = content;
                if state.current != state.saved {
                    state.lifecycle = Lifecycle::Modified;
                } else if state.lifecycle == Lifecycle::Modified {
                    state.lifecycle = Lifecycle::Saved;
                }
                true
            }
        };

        if changed {
            let _ = self.events.send(EditorEvent::ContentChanged);
        }
    }

    async fn write_output(&self, path: &Path, bytes: &[u8]) -> Result<(), EditorError> {
        if self.is_closed() {
            log::debug!(
                "Editor {} closed before {} could be written",
                self.id,
                path.display()
            );
            return Err(EditorError::Closed(self.id));
        }
        write_file(path, bytes)
            .await
            .map_err(|e| EditorError::io(path, e))
    }

    /// The webview is gone: fail its requests and tell observers
    pub(crate) async fn close(&self) {
        {
            let mut state = self.state.lock().await;
            if state.lifecycle == Lifecycle::Closed {
                return;
            }
            state.lifecycle = Lifecycle::Closed;
        }
        self.webview.close().await;
        self.closed.send_replace(true);
        let _ = self.events.send(EditorEvent::Closed);
        log::debug!("Editor {} for {} closed", self.id, self.path().display());
    }
}
