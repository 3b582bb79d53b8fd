//! Editor Registry
//!
//! Tracks open editors and which one has focus. The manager only observes:
//! providers own editors, the registry keeps weak references.

use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, broadcast};

use super::{DrawioEditor, EditorId};

/// Fired on every change of the active editor, including to and from none
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveEditorChanged {
    pub previous: Option<EditorId>,
    pub current: Option<EditorId>,
}

#[derive(Default)]
struct Registry {
    /// Registration order
    editors: Vec<(EditorId, Weak<DrawioEditor>)>,
    /// Always `None` or a member of `editors`
    active: Option<EditorId>,
}

impl Registry {
    fn get(&self, id: EditorId) -> Option<Arc<DrawioEditor>> {
        self.editors
            .iter()
            .find(|(editor_id, _)| *editor_id == id)
            .and_then(|(_, editor)| editor.upgrade())
    }

    fn contains(&self, id: EditorId) -> bool {
        self.editors.iter().any(|(editor_id, _)| *editor_id == id)
    }

    /// Drop entries whose editor no longer exists; returns the previous active id
    /// if it was among them.
    fn prune(&mut self) -> Option<EditorId> {
        self.editors.retain(|(_, editor)| editor.strong_count() > 0);
        match self.active {
            Some(id) if !self.contains(id) => self.active.take(),
            _ => None,
        }
    }
}

/// Registry of open diagram editors and the focused one
pub struct DrawioEditorManager {
    registry: Mutex<Registry>,
    events: broadcast::Sender<ActiveEditorChanged>,
}

impl Default for DrawioEditorManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawioEditorManager {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            registry: Mutex::new(Registry::default()),
            events,
        }
    }

    /// Subscribe to active-editor transitions
    pub fn subscribe(&self) -> broadcast::Receiver<ActiveEditorChanged> {
        self.events.subscribe()
    }

    /// Add an editor. Registering the same editor twice is a no-op.
    pub async fn register_editor(&self, editor: &Arc<DrawioEditor>) -> bool {
        let mut registry = self.registry.lock().await;
        if registry.contains(editor.id()) {
            return false;
        }
        registry.editors.push((editor.id(), Arc::downgrade(editor)));
        true
    }

    /// Forget an editor, clearing the active pointer if it pointed there
    pub async fn unregister_editor(&self, id: EditorId) {
        let change = {
            let mut registry = self.registry.lock().await;
            registry.editors.retain(|(editor_id, _)| *editor_id != id);
            let pruned = registry.prune();

            if registry.active == Some(id) {
                registry.active = None;
                Some(id)
            } else {
                pruned
            }
        };

        if let Some(previous) = change {
            self.announce(Some(previous), None);
        }
    }

    /// Host focus transition for `id`. Unknown editors are ignored.
    pub async fn set_focus(&self, id: EditorId, focused: bool) {
        let change = {
            let mut registry = self.registry.lock().await;
            let pruned = registry.prune();
            let previous = registry.active;

            if focused && registry.contains(id) {
                registry.active = Some(id);
            } else if !focused && registry.active == Some(id) {
                registry.active = None;
            }

            let previous = previous.or(pruned);
            (previous != registry.active).then_some((previous, registry.active))
        };

        if let Some((previous, current)) = change {
            self.announce(previous, current);
        }
    }

    pub async fn active_editor_id(&self) -> Option<EditorId> {
        let registry = self.registry.lock().await;
        registry.active.filter(|id| registry.get(*id).is_some())
    }

    /// The focused editor, if any
    pub async fn active_drawio_editor(&self) -> Option<Arc<DrawioEditor>> {
        let registry = self.registry.lock().await;
        registry.active.and_then(|id| registry.get(id))
    }

    pub async fn editor(&self, id: EditorId) -> Option<Arc<DrawioEditor>> {
        self.registry.lock().await.get(id)
    }

    /// Live editors in registration order
    pub async fn editors(&self) -> Vec<Arc<DrawioEditor>> {
        self.registry
            .lock()
            .await
            .editors
            .iter()
            .filter_map(|(_, editor)| editor.upgrade())
            .collect()
    }

    fn announce(&self, previous: Option<EditorId>, current: Option<EditorId>) {
        log::debug!("Active diagram editor changed: {:?} -> {:?}", previous, current);
        let _ = self.events.send(ActiveEditorChanged { previous, current });
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::codec::DiagramFormat;
    use crate::config::Config;
    use crate::host::HostDocument;

    fn editor(name: &str) -> Arc<DrawioEditor> {
        let document = Arc::new(HostDocument::with_content(Path::new(name), Vec::new()));
        DrawioEditor::new(
            "drawio.text",
            DiagramFormat::Drawio,
            document,
            Arc::new(Config::default()),
            String::new(),
        )
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let manager = DrawioEditorManager::new();
        let a = editor("a.drawio");

        assert!(manager.register_editor(&a).await);
        assert!(!manager.register_editor(&a).await);
        assert_eq!(manager.editors().await.len(), 1);
    }

    #[tokio::test]
    async fn test_focus_transitions_fire_events() {
        let manager = DrawioEditorManager::new();
        let mut events = manager.subscribe();
        let (a, b) = (editor("a.drawio"), editor("b.drawio"));
        manager.register_editor(&a).await;
        manager.register_editor(&b).await;

        assert!(manager.active_drawio_editor().await.is_none());

        manager.set_focus(a.id(), true).await;
        manager.set_focus(b.id(), true).await;
        manager.set_focus(a.id(), false).await;
        manager.set_focus(b.id(), false).await;

        let expected = [
            (None, Some(a.id())),
            (Some(a.id()), Some(b.id())),
            (Some(b.id()), None),
        ];
        for (previous, current) in expected {
            assert_eq!(
                events.recv().await.unwrap(),
                ActiveEditorChanged { previous, current }
            );
        }
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregister_clears_active() {
        let manager = DrawioEditorManager::new();
        let a = editor("a.drawio");
        manager.register_editor(&a).await;
        manager.set_focus(a.id(), true).await;
        assert_eq!(manager.active_editor_id().await, Some(a.id()));

        manager.unregister_editor(a.id()).await;
        assert!(manager.active_drawio_editor().await.is_none());
        assert!(manager.editors().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_editor_cannot_take_focus() {
        let manager = DrawioEditorManager::new();
        let stranger = editor("x.drawio");

        manager.set_focus(stranger.id(), true).await;
        assert!(manager.active_drawio_editor().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_editor_is_never_returned() {
        let manager = DrawioEditorManager::new();
        let a = editor("a.drawio");
        let id = a.id();
        manager.register_editor(&a).await;
        manager.set_focus(id, true).await;

        drop(a);
        assert!(manager.active_drawio_editor().await.is_none());
        assert!(manager.active_editor_id().await.is_none());
        assert!(manager.editor(id).await.is_none());
    }
}
