//! Two queues between the host and one webview.
//!
//! The webview runs independently; the host only ever sees its messages.
//! Each queue preserves send order. Dropping either end closes the webview.

use tokio::sync::mpsc;

use super::protocol::{HostMessage, WebviewMessage};

/// Host end, handed to a provider when the host resolves an editor
#[derive(Debug)]
pub struct WebviewHandle {
    pub(crate) outgoing: mpsc::UnboundedSender<HostMessage>,
    pub(crate) incoming: mpsc::UnboundedReceiver<WebviewMessage>,
}

/// Webview end: the embedded tool, a transport bridge, or a test double
#[derive(Debug)]
pub struct WebviewPeer {
    incoming: mpsc::UnboundedReceiver<HostMessage>,
    outgoing: mpsc::UnboundedSender<WebviewMessage>,
}

/// Create a connected handle/peer pair
pub fn channel() -> (WebviewHandle, WebviewPeer) {
    let (host_tx, host_rx) = mpsc::unbounded_channel();
    let (webview_tx, webview_rx) = mpsc::unbounded_channel();

    (
        WebviewHandle {
            outgoing: host_tx,
            incoming: webview_rx,
        },
        WebviewPeer {
            incoming: host_rx,
            outgoing: webview_tx,
        },
    )
}

impl WebviewPeer {
    /// Post a message to the host. Returns `false` once the host side is gone.
    pub fn send(&self, message: WebviewMessage) -> bool {
        self.outgoing.send(message).is_ok()
    }

    /// Next message from the host, `None` once the host side is gone
    pub async fn recv(&mut self) -> Option<HostMessage> {
        self.incoming.recv().await
    }

    pub fn try_recv(&mut self) -> Option<HostMessage> {
        self.incoming.try_recv().ok()
    }

    /// Split into raw halves for transports that pump each direction separately
    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedReceiver<HostMessage>,
        mpsc::UnboundedSender<WebviewMessage>,
    ) {
        (self.incoming, self.outgoing)
    }
}
