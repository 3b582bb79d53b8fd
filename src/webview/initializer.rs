//! Webview Initialization
//!
//! Binds a fresh webview channel to an editor: queues the handshake, then runs
//! one pump task per connection that feeds webview messages to the editor in
//! arrival order and forwards configuration changes the other way.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

use super::channel::WebviewHandle;
use super::protocol::{HostMessage, WebviewMessage, WebviewOptions};
use crate::config::{Config, ConfigChange};
use crate::editor::DrawioEditor;

/// Options sent with every `init` message
pub(crate) async fn webview_options(config: &Config) -> WebviewOptions {
    WebviewOptions {
        retain_context_when_hidden: config.retain_context_when_hidden().await,
        code_link_activated: config.code_link_activated().await,
    }
}

pub struct DrawioWebviewInitializer {
    config: Arc<Config>,
}

impl DrawioWebviewInitializer {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Attach `handle` to `editor` and start its pump.
    ///
    /// `init` and `load` are queued first; nothing reaches the webview before it
    /// reports `ready`.
    pub async fn initialize_webview(&self, editor: &Arc<DrawioEditor>, handle: WebviewHandle) {
        let WebviewHandle { outgoing, incoming } = handle;
        let connection = editor.webview();
        connection.attach(outgoing).await;

        let options = webview_options(&self.config).await;
        let load = HostMessage::Load {
            content: editor.current_diagram().await,
            theme: editor.theme().await,
        };
        for message in [HostMessage::Init { options }, load] {
            if let Err(e) = connection.send(message).await {
                log::warn!("Failed to queue handshake for editor {}: {}", editor.id(), e);
            }
        }

        tokio::spawn(pump(editor.clone(), incoming, self.config.clone()));
    }
}

async fn pump(
    editor: Arc<DrawioEditor>,
    mut incoming: mpsc::UnboundedReceiver<WebviewMessage>,
    config: Arc<Config>,
) {
    let mut changes = config.subscribe();

    loop {
        tokio::select! {
            message = incoming.recv() => match message {
                Some(message) => editor.handle_message(message).await,
                None => break,
            },
            change = changes.recv() => match change {
                Ok(change) => forward_change(&editor, &config, change).await,
                Err(RecvError::Lagged(skipped)) => {
                    log::debug!("Editor {} missed {} config changes", editor.id(), skipped);
                    editor.follow_config_theme(config.theme().await).await;
                }
                // Config dropped; keep serving the webview.
                Err(RecvError::Closed) => {
                    while let Some(message) = incoming.recv().await {
                        editor.handle_message(message).await;
                    }
                    break;
                }
            },
        }
    }

    editor.close().await;
}

async fn forward_change(editor: &DrawioEditor, config: &Config, change: ConfigChange) {
    match change {
        ConfigChange::Theme(theme) => editor.follow_config_theme(theme).await,
        ConfigChange::CodeLinkActivated(_) | ConfigChange::RetainContextWhenHidden(_) => {
            let options = webview_options(config).await;
            if let Err(e) = editor.webview().send(HostMessage::Init { options }).await {
                log::debug!("Editor {} did not take new options: {}", editor.id(), e);
            }
        }
        _ => {}
    }
}
