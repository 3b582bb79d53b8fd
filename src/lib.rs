//! draw.io Editor Host
//!
//! Hosts the draw.io diagram editor for `.drawio`, `.dio`, `.drawio.svg` and
//! `.drawio.png` files.
//!
//! This library provides:
//! - Codecs that extract and re-embed diagram XML for every file format
//! - Custom editor providers with a save/revert/backup lifecycle
//! - The webview message protocol and its request/response plumbing
//! - Commands, code links and a text mirror of the active diagram
//! - Configuration management with live reload

pub mod bridge;
pub mod codec;
pub mod commands;
pub mod config;
pub mod editor;
pub mod error;
pub mod extension;
pub mod features;
pub mod host;
pub mod webview;

// Re-exports for the public API
pub use codec::{DiagramFormat, ExportFormat};
pub use config::{Config, Settings, Theme};
pub use editor::{DrawioEditor, DrawioEditorManager, EditorId};
pub use error::{CodecError, ConfigError, EditorError, WebviewError};
pub use extension::{Extension, HostServices};
