//! Editor Features
//!
//! Services that follow whichever diagram editor has focus. Each one implements
//! [`ActiveEditorObserver`] and is driven by [`spawn_observer`].

pub mod code_link;
pub mod text_view;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::editor::{DrawioEditor, DrawioEditorManager, EditorEvent};

pub use code_link::{CodeLink, LinkCodeWithSelectedNodeService};
pub use text_view::EditDiagramAsTextService;

/// Reacts to focus changes and to events of the focused editor
#[async_trait]
pub trait ActiveEditorObserver: Send + Sync + 'static {
    async fn active_editor_changed(&self, editor: Option<Arc<DrawioEditor>>);

    async fn editor_event(&self, _editor: &Arc<DrawioEditor>, _event: EditorEvent) {}
}

/// Feed `observer` until the manager goes away
pub fn spawn_observer<O: ActiveEditorObserver>(
    manager: Arc<DrawioEditorManager>,
    observer: Arc<O>,
) -> JoinHandle<()> {
    let mut changes = manager.subscribe();

    tokio::spawn(async move {
        let mut active = manager.active_drawio_editor().await;
        let mut events = active.as_ref().map(|editor| editor.subscribe());
        observer.active_editor_changed(active.clone()).await;

        loop {
            tokio::select! {
                change = changes.recv() => match change {
                    Ok(_) | Err(RecvError::Lagged(_)) => {
                        active = manager.active_drawio_editor().await;
                        events = active.as_ref().map(|editor| editor.subscribe());
                        observer.active_editor_changed(active.clone()).await;
                    }
                    Err(RecvError::Closed) => break,
                },
                event = next_event(&mut events) => {
                    let Some(editor) = &active else { continue };
                    match event {
                        Ok(event) => observer.editor_event(editor, event).await,
                        Err(RecvError::Lagged(skipped)) => {
                            log::debug!(
                                "Observer missed {} events of editor {}",
                                skipped,
                                editor.id()
                            );
                            observer.editor_event(editor, EditorEvent::ContentChanged).await;
                        }
                        Err(RecvError::Closed) => events = None,
                    }
                }
            }
        }
    })
}

async fn next_event(
    events: &mut Option<broadcast::Receiver<EditorEvent>>,
) -> Result<EditorEvent, RecvError> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}
