//! Webview Boundary
//!
//! The embedded diagram tool runs on the far side of a message channel. This
//! module holds the wire protocol, the channel pair, per-connection state and
//! the handshake that binds a channel to an editor.

pub mod channel;
pub mod connection;
pub mod initializer;
pub mod protocol;

pub use channel::{WebviewHandle, WebviewPeer, channel};
pub use connection::WebviewConnection;
pub use initializer::DrawioWebviewInitializer;
pub use protocol::{HostMessage, Reply, RequestId, WebviewMessage, WebviewOptions};
