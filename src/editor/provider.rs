//! Custom Editor Providers
//!
//! One lifecycle state machine for both document encodings. A [`DocumentKind`]
//! decides which files a provider takes, how their bytes are decoded and
//! encoded, and whether a document may be open in more than one editor.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use super::{DrawioEditor, DrawioEditorManager, EditorId, PendingOperation};
use crate::codec::DiagramFormat;
use crate::error::{CodecError, EditorError};
use crate::host::{HostDocument, write_file};
use crate::webview::channel::WebviewHandle;
use crate::webview::initializer::DrawioWebviewInitializer;

/// Encoding strategy and instance policy of a provider
pub trait DocumentKind: Send + Sync + 'static {
    /// Identifier the provider is registered under
    const VIEW_TYPE: &'static str;
    const MULTIPLE_EDITORS_PER_DOCUMENT: bool;

    fn accepts(format: DiagramFormat) -> bool;

    fn decode(format: DiagramFormat, bytes: &[u8]) -> Result<String, CodecError>;

    fn encode(format: DiagramFormat, container: &[u8], diagram: &str)
    -> Result<Vec<u8>, CodecError>;
}

/// Diagrams stored as text (`.drawio`, `.dio`, `.drawio.svg`).
///
/// The document is a text buffer the host may show in several editors at once.
pub struct TextDocuments;

impl DocumentKind for TextDocuments {
    const VIEW_TYPE: &'static str = "drawio.text";
    const MULTIPLE_EDITORS_PER_DOCUMENT: bool = true;

    fn accepts(format: DiagramFormat) -> bool {
        !format.is_binary()
    }

    fn decode(format: DiagramFormat, bytes: &[u8]) -> Result<String, CodecError> {
        std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
        format.decode(bytes)
    }

    fn encode(
        format: DiagramFormat,
        container: &[u8],
        diagram: &str,
    ) -> Result<Vec<u8>, CodecError> {
        format.encode(container, diagram)
    }
}

/// Diagrams stored in binary images (`.drawio.png`).
///
/// The embedded tool holds the only editable copy, so one editor per document.
pub struct BinaryDocuments;

impl DocumentKind for BinaryDocuments {
    const VIEW_TYPE: &'static str = "drawio.binary";
    const MULTIPLE_EDITORS_PER_DOCUMENT: bool = false;

    fn accepts(format: DiagramFormat) -> bool {
        format.is_binary()
    }

    fn decode(format: DiagramFormat, bytes: &[u8]) -> Result<String, CodecError> {
        format.decode(bytes)
    }

    fn encode(
        format: DiagramFormat,
        container: &[u8],
        diagram: &str,
    ) -> Result<Vec<u8>, CodecError> {
        format.encode(container, diagram)
    }
}

pub type DrawioEditorProviderText = DrawioEditorProvider<TextDocuments>;
pub type DrawioEditorProviderBinary = DrawioEditorProvider<BinaryDocuments>;

/// Opens, saves, reverts and backs up the documents of one [`DocumentKind`]
pub struct DrawioEditorProvider<K: DocumentKind> {
    initializer: Arc<DrawioWebviewInitializer>,
    manager: Arc<DrawioEditorManager>,
    /// The provider owns its editors; the manager only observes them
    editors: Arc<Mutex<HashMap<EditorId, Arc<DrawioEditor>>>>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: DocumentKind> DrawioEditorProvider<K> {
    pub fn new(
        initializer: Arc<DrawioWebviewInitializer>,
        manager: Arc<DrawioEditorManager>,
    ) -> Self {
        Self {
            initializer,
            manager,
            editors: Arc::new(Mutex::new(HashMap::new())),
            _kind: PhantomData,
        }
    }

    pub fn view_type(&self) -> &'static str {
        K::VIEW_TYPE
    }

    pub fn supports_multiple_editors_per_document(&self) -> bool {
        K::MULTIPLE_EDITORS_PER_DOCUMENT
    }

    /// Whether this provider handles the file
    pub fn accepts(&self, path: &Path) -> bool {
        DiagramFormat::from_path(path).is_some_and(K::accepts)
    }

    /// Open `path` in a new editor bound to `webview`.
    ///
    /// Text documents already open elsewhere are shared; binary documents
    /// already open are rejected. Nothing is registered if decoding fails.
    pub async fn open(
        &self,
        path: impl AsRef<Path>,
        webview: WebviewHandle,
    ) -> Result<Arc<DrawioEditor>, EditorError> {
        let path = path.as_ref().to_path_buf();
        let format = DiagramFormat::from_path(&path)
            .filter(|format| K::accepts(*format))
            .ok_or_else(|| EditorError::UnsupportedFile(path.clone()))?;

        // Held until the editor is inserted so two opens cannot race past the check.
        let mut editors = self.editors.lock().await;
        let existing = editors
            .values()
            .find(|editor| editor.path() == path && !editor.is_closed())
            .map(|editor| editor.document().clone());

        let document = match existing {
            Some(_) if !K::MULTIPLE_EDITORS_PER_DOCUMENT => {
                log::warn!("{} is already open, refusing a second editor", path.display());
                return Err(EditorError::AlreadyOpen(path));
            }
            Some(document) => document,
            None => Arc::new(
                HostDocument::open(&path)
                    .await
                    .map_err(|e| EditorError::io(&path, e))?,
            ),
        };

        let bytes = document.content().await;
        let diagram = K::decode(format, &bytes).map_err(|source| EditorError::Decode {
            path: path.clone(),
            source,
        })?;

        let editor = DrawioEditor::new(
            K::VIEW_TYPE,
            format,
            document,
            self.initializer.config().clone(),
            diagram,
        );
        self.initializer.initialize_webview(&editor, webview).await;
        editors.insert(editor.id(), editor.clone());
        drop(editors);

        self.manager.register_editor(&editor).await;
        self.forget_when_closed(&editor);

        log::info!(
            "Opened {} in editor {} ({})",
            path.display(),
            editor.id(),
            K::VIEW_TYPE
        );
        Ok(editor)
    }

    pub async fn editor(&self, id: EditorId) -> Option<Arc<DrawioEditor>> {
        self.editors.lock().await.get(&id).cloned()
    }

    /// Open editors, oldest first
    pub async fn editors(&self) -> Vec<Arc<DrawioEditor>> {
        let mut editors: Vec<_> = self.editors.lock().await.values().cloned().collect();
        editors.sort_by_key(|editor| editor.id());
        editors
    }

    pub async fn editors_for(&self, path: &Path) -> Vec<Arc<DrawioEditor>> {
        let mut editors = self.editors().await;
        editors.retain(|editor| editor.path() == path);
        editors
    }

    pub async fn dirty_editors(&self) -> Vec<Arc<DrawioEditor>> {
        let mut dirty = Vec::new();
        for editor in self.editors().await {
            if editor.is_dirty().await {
                dirty.push(editor);
            }
        }
        dirty
    }

    /// Write the webview's current diagram to the document.
    ///
    /// Nothing is written unless the webview answers in time. A response that
    /// arrives after the editor closed is dropped.
    pub async fn save(&self, id: EditorId) -> Result<(), EditorError> {
        let editor = self.require(id).await?;

        editor
            .run_exclusive(PendingOperation::Saving, async {
                let diagram = editor.request_content().await?;
                if editor.is_closed() {
                    log::debug!("Editor {} closed during save, dropping content", id);
                    return Ok(());
                }

                let bytes = self.encode_for(&editor, &diagram).await?;
                editor
                    .document()
                    .write(bytes)
                    .await
                    .map_err(|e| EditorError::io(editor.path(), e))?;
                editor.mark_saved(diagram.clone()).await;
                log::info!("Saved {}", editor.path().display());

                self.refresh_siblings(&editor, &diagram).await;
                Ok(())
            })
            .await
    }

    /// Write the current diagram to another file of the same format
    pub async fn save_as(&self, id: EditorId, destination: &Path) -> Result<(), EditorError> {
        let editor = self.require(id).await?;
        if DiagramFormat::from_path(destination) != Some(editor.format()) {
            return Err(EditorError::UnsupportedFile(destination.to_path_buf()));
        }

        editor
            .run_exclusive(PendingOperation::Saving, async {
                let diagram = editor.request_content().await?;
                let bytes = self.encode_for(&editor, &diagram).await?;
                write_file(destination, &bytes)
                    .await
                    .map_err(|e| EditorError::io(destination, e))?;
                log::info!(
                    "Saved {} as {}",
                    editor.path().display(),
                    destination.display()
                );
                Ok(())
            })
            .await
    }

    /// Throw away unsaved changes and reload the webview from the file on disk
    pub async fn revert(&self, id: EditorId) -> Result<(), EditorError> {
        let editor = self.require(id).await?;
        let bytes = editor
            .document()
            .reload()
            .await
            .map_err(|e| EditorError::io(editor.path(), e))?;
        let diagram =
            K::decode(editor.format(), &bytes).map_err(|source| EditorError::Decode {
                path: editor.path().to_path_buf(),
                source,
            })?;

        editor.reload(diagram.clone()).await?;
        self.refresh_siblings(&editor, &diagram).await;
        log::info!("Reverted {}", editor.path().display());
        Ok(())
    }

    /// Snapshot the current diagram into `backup_dir`, returning the backup file
    pub async fn backup(&self, id: EditorId, backup_dir: &Path) -> Result<PathBuf, EditorError> {
        let editor = self.require(id).await?;

        editor
            .run_exclusive(PendingOperation::BackingUp, async {
                let diagram = editor.request_content().await?;
                let bytes = self.encode_for(&editor, &diagram).await?;

                let name = editor
                    .path()
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "diagram".to_string());
                let path = backup_dir.join(format!("{}.{}.bak", name, id.as_u64()));
                write_file(&path, &bytes)
                    .await
                    .map_err(|e| EditorError::io(&path, e))?;
                log::debug!("Backed up {} to {}", editor.path().display(), path.display());
                Ok(path)
            })
            .await
    }

    async fn require(&self, id: EditorId) -> Result<Arc<DrawioEditor>, EditorError> {
        let editor = self
            .editor(id)
            .await
            .ok_or(EditorError::UnknownEditor(id))?;
        if editor.is_closed() {
            return Err(EditorError::Closed(id));
        }
        Ok(editor)
    }

    /// Encode `diagram` into the document's container.
    ///
    /// An unchanged diagram keeps the existing container so the bytes stay
    /// identical; a changed one in an image format gets a fresh rendering.
    async fn encode_for(
        &self,
        editor: &DrawioEditor,
        diagram: &str,
    ) -> Result<Vec<u8>, EditorError> {
        let format = editor.format();
        let original = editor.document().content().await;
        let unchanged = K::decode(format, &original).is_ok_and(|saved| saved == diagram);

        let container = if format.needs_rendered_container() && !unchanged {
            editor.render(format).await?
        } else {
            original
        };
        Ok(K::encode(format, &container, diagram)?)
    }

    /// Show a saved or reverted diagram in other clean editors of the same
    /// document. Dirty ones keep their edits and only move their baseline.
    async fn refresh_siblings(&self, editor: &DrawioEditor, diagram: &str) {
        for sibling in self.editors_for(editor.path()).await {
            if sibling.id() == editor.id() {
                continue;
            }
            if sibling.is_dirty().await {
                sibling.rebase_saved(diagram.to_string()).await;
            } else if let Err(e) = sibling.reload(diagram.to_string()).await {
                log::debug!("Could not refresh editor {}: {}", sibling.id(), e);
            }
        }
    }

    fn forget_when_closed(&self, editor: &Arc<DrawioEditor>) {
        let editors = self.editors.clone();
        let manager = self.manager.clone();
        let editor = editor.clone();

        tokio::spawn(async move {
            editor.closed().await;
            editors.lock().await.remove(&editor.id());
            manager.unregister_editor(editor.id()).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_policies() {
        assert!(TextDocuments::accepts(DiagramFormat::Drawio));
        assert!(TextDocuments::accepts(DiagramFormat::DrawioSvg));
        assert!(!TextDocuments::accepts(DiagramFormat::DrawioPng));
        assert!(BinaryDocuments::accepts(DiagramFormat::DrawioPng));
        assert!(!BinaryDocuments::accepts(DiagramFormat::Drawio));

        assert!(TextDocuments::MULTIPLE_EDITORS_PER_DOCUMENT);
        assert!(!BinaryDocuments::MULTIPLE_EDITORS_PER_DOCUMENT);
    }

    #[test]
    fn test_text_documents_require_utf8() {
        assert_eq!(
            TextDocuments::decode(DiagramFormat::Drawio, &[0xc3, 0x28]),
            Err(CodecError::InvalidUtf8)
        );
    }
}
