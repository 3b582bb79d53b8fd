//! Text mirror of the active diagram.
//!
//! Keeps the raw XML of the focused editor available for a text view and
//! pushes edited text back as a full reload.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};

use super::ActiveEditorObserver;
use crate::editor::{DrawioEditor, DrawioEditorManager, EditorEvent, EditorId};
use crate::error::EditorError;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Mirror {
    editor: EditorId,
    text: String,
}

pub struct EditDiagramAsTextService {
    manager: Arc<DrawioEditorManager>,
    mirror: Mutex<Option<Mirror>>,
    updates: watch::Sender<Option<String>>,
}

impl EditDiagramAsTextService {
    pub fn new(manager: Arc<DrawioEditorManager>) -> Self {
        let (updates, _) = watch::channel(None);
        Self {
            manager,
            mirror: Mutex::new(None),
            updates,
        }
    }

    /// XML of the active editor as last mirrored
    pub async fn text(&self) -> Option<String> {
        self.mirror.lock().await.as_ref().map(|mirror| mirror.text.clone())
    }

    /// Follow mirror updates; `None` while no diagram editor is active
    pub fn watch(&self) -> watch::Receiver<Option<String>> {
        self.updates.subscribe()
    }

    /// Load `text` into the active editor. The editor turns dirty once the
    /// webview confirms a diagram different from the saved one.
    pub async fn apply_text(&self, text: String) -> Result<(), EditorError> {
        let Some(editor) = self.manager.active_drawio_editor().await else {
            log::debug!("No active diagram editor to apply text to");
            return Ok(());
        };
        editor.apply_edit(text).await?;
        self.refresh(Some(&editor)).await;
        Ok(())
    }

    async fn refresh(&self, editor: Option<&Arc<DrawioEditor>>) {
        let mirror = match editor {
            Some(editor) => Some(Mirror {
                editor: editor.id(),
                text: editor.current_diagram().await,
            }),
            None => None,
        };

        let mut current = self.mirror.lock().await;
        if *current != mirror {
            self.updates
                .send_replace(mirror.as_ref().map(|mirror| mirror.text.clone()));
            *current = mirror;
        }
    }
}

#[async_trait]
impl ActiveEditorObserver for EditDiagramAsTextService {
    async fn active_editor_changed(&self, editor: Option<Arc<DrawioEditor>>) {
        self.refresh(editor.as_ref()).await;
    }

    async fn editor_event(&self, editor: &Arc<DrawioEditor>, event: EditorEvent) {
        match event {
            EditorEvent::ContentChanged | EditorEvent::Ready => self.refresh(Some(editor)).await,
            EditorEvent::Closed => self.refresh(None).await,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::codec::DiagramFormat;
    use crate::config::Config;
    use crate::host::HostDocument;

    #[tokio::test]
    async fn test_mirror_follows_active_editor() {
        let manager = Arc::new(DrawioEditorManager::new());
        let service = EditDiagramAsTextService::new(manager.clone());
        let document = Arc::new(HostDocument::with_content(
            Path::new("a.drawio"),
            b"<mxfile/>".to_vec(),
        ));
        let editor = DrawioEditor::new(
            "drawio.text",
            DiagramFormat::Drawio,
            document,
            Arc::new(Config::default()),
            "<mxfile/>".to_string(),
        );
        let mut updates = service.watch();

        service.active_editor_changed(Some(editor.clone())).await;
        assert_eq!(service.text().await.as_deref(), Some("<mxfile/>"));
        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().as_deref(), Some("<mxfile/>"));

        service.active_editor_changed(None).await;
        assert_eq!(service.text().await, None);
        assert_eq!(*updates.borrow_and_update(), None);
    }

    #[tokio::test]
    async fn test_apply_without_active_editor_is_a_no_op() {
        let service = EditDiagramAsTextService::new(Arc::new(DrawioEditorManager::new()));
        service.apply_text("<mxfile/>".to_string()).await.unwrap();
        assert_eq!(service.text().await, None);
    }
}
