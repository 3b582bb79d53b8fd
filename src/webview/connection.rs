//! Host-side state of one webview: the ready gate, the pre-ready queue and the
//! table of requests awaiting a response.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot};

use super::protocol::{HostMessage, Reply, RequestId};
use crate::error::WebviewError;

type Responder = oneshot::Sender<Result<Reply, WebviewError>>;

struct ConnectionState {
    outgoing: Option<mpsc::UnboundedSender<HostMessage>>,
    ready: bool,
    closed: bool,
    /// Messages held back until the webview reports ready, in send order
    queued: VecDeque<HostMessage>,
    /// Pending outgoing requests awaiting responses
    pending: HashMap<RequestId, Responder>,
    next_id: RequestId,
}

impl ConnectionState {
    fn dispatch(&mut self, message: HostMessage) -> Result<(), WebviewError> {
        if self.closed {
            return Err(WebviewError::Closed);
        }
        match &self.outgoing {
            Some(tx) if self.ready => {
                if tx.send(message).is_err() {
                    self.closed = true;
                    return Err(WebviewError::Closed);
                }
                Ok(())
            }
            _ => {
                self.queued.push_back(message);
                Ok(())
            }
        }
    }
}

/// Cloneable handle to the host side of a webview
#[derive(Clone)]
pub struct WebviewConnection {
    state: Arc<Mutex<ConnectionState>>,
}

impl Default for WebviewConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl WebviewConnection {
    /// A connection that queues everything until attached and ready
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ConnectionState {
                outgoing: None,
                ready: false,
                closed: false,
                queued: VecDeque::new(),
                pending: HashMap::new(),
                next_id: 1,
            })),
        }
    }

    pub(crate) async fn attach(&self, outgoing: mpsc::UnboundedSender<HostMessage>) {
        self.state.lock().await.outgoing = Some(outgoing);
    }

    /// Post a fire-and-forget message, queued if the webview is not ready yet
    pub async fn send(&self, message: HostMessage) -> Result<(), WebviewError> {
        self.state.lock().await.dispatch(message)
    }

    /// Send a request and wait for the response carrying the same id.
    ///
    /// On timeout the request is forgotten, so a late response is treated as stale.
    pub async fn request(
        &self,
        build: impl FnOnce(RequestId) -> HostMessage,
        timeout: Duration,
    ) -> Result<Reply, WebviewError> {
        let (id, rx) = {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(WebviewError::Closed);
            }
            let id = state.next_id;
            state.next_id += 1;

            let (tx, rx) = oneshot::channel();
            state.pending.insert(id, tx);
            if let Err(e) = state.dispatch(build(id)) {
                state.pending.remove(&id);
                return Err(e);
            }
            (id, rx)
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(WebviewError::Closed),
            Err(_) => {
                self.state.lock().await.pending.remove(&id);
                Err(WebviewError::Timeout(timeout.as_millis()))
            }
        }
    }

    /// Open the gate and flush queued messages in order.
    ///
    /// Returns `false` if the webview had already been ready, which means it reloaded.
    pub(crate) async fn mark_ready(&self) -> bool {
        let mut state = self.state.lock().await;
        let first = !state.ready;
        state.ready = true;

        while let Some(message) = state.queued.pop_front() {
            if state.dispatch(message).is_err() {
                log::debug!("Webview closed while flushing queued messages");
                state.queued.clear();
                break;
            }
        }
        first
    }

    /// Complete a pending request. Returns `false` for a stale or unknown id.
    pub(crate) async fn resolve(&self, id: RequestId, result: Result<Reply, WebviewError>) -> bool {
        let responder = self.state.lock().await.pending.remove(&id);
        match responder {
            // The requester may have timed out in the meantime.
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }

    /// Mark the webview gone and fail every pending request
    pub(crate) async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        state.outgoing = None;
        state.queued.clear();
        for (_, tx) in state.pending.drain() {
            let _ = tx.send(Err(WebviewError::Closed));
        }
    }

    pub async fn is_ready(&self) -> bool {
        self.state.lock().await.ready
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    pub async fn pending_requests(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn queued_messages(&self) -> usize {
        self.state.lock().await.queued.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Theme;
    use crate::webview::protocol::HostMessage;

    use super::*;

    fn set_theme(theme: Theme) -> HostMessage {
        HostMessage::SetTheme { theme }
    }

    #[tokio::test]
    async fn test_messages_wait_for_ready() {
        let connection = WebviewConnection::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        connection.attach(tx).await;

        connection.send(set_theme(Theme::Min)).await.unwrap();
        connection.send(set_theme(Theme::Dark)).await.unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(connection.queued_messages().await, 2);

        assert!(!connection.is_ready().await);
        assert!(connection.mark_ready().await);
        assert!(connection.is_ready().await);
        assert_eq!(rx.recv().await, Some(set_theme(Theme::Min)));
        assert_eq!(rx.recv().await, Some(set_theme(Theme::Dark)));

        connection.send(set_theme(Theme::Atlas)).await.unwrap();
        assert_eq!(rx.recv().await, Some(set_theme(Theme::Atlas)));
        assert!(!connection.mark_ready().await);
    }

    #[tokio::test]
    async fn test_request_resolves_by_id() {
        let connection = WebviewConnection::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        connection.attach(tx).await;
        connection.mark_ready().await;

        let responder = connection.clone();
        let answer = tokio::spawn(async move {
            let message = rx.recv().await.unwrap();
            let id = message.request_id().unwrap();
            assert!(!responder.resolve(id + 100, Ok(Reply::Content("x".into()))).await);
            assert!(responder.resolve(id, Ok(Reply::Content("<mxfile/>".into()))).await);
        });

        let reply = connection
            .request(
                |request_id| HostMessage::GetContent { request_id },
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        answer.await.unwrap();

        assert_eq!(reply, Reply::Content("<mxfile/>".to_string()));
        assert_eq!(connection.pending_requests().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_forgets_request() {
        let connection = WebviewConnection::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        connection.attach(tx).await;
        connection.mark_ready().await;

        let result = connection
            .request(
                |request_id| HostMessage::GetContent { request_id },
                Duration::from_millis(50),
            )
            .await;

        assert_eq!(result, Err(WebviewError::Timeout(50)));
        assert_eq!(connection.pending_requests().await, 0);
        assert!(!connection.resolve(1, Ok(Reply::Content(String::new()))).await);
    }

    #[tokio::test]
    async fn test_close_fails_pending_requests() {
        let connection = WebviewConnection::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        connection.attach(tx).await;

        let closer = connection.clone();
        tokio::spawn(async move {
            while closer.pending_requests().await == 0 {
                tokio::task::yield_now().await;
            }
            closer.close().await;
        });

        let result = connection
            .request(
                |request_id| HostMessage::GetContent { request_id },
                Duration::from_secs(5),
            )
            .await;
        assert_eq!(result, Err(WebviewError::Closed));
        assert_eq!(
            connection.send(set_theme(Theme::Min)).await,
            Err(WebviewError::Closed)
        );
    }
}
