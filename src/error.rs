//! Typed errors shared across the crate.
//!
//! Library callers match on these; the binary and the extension glue wrap them
//! in `anyhow` with context.

use std::path::PathBuf;

use thiserror::Error;

use crate::editor::EditorId;

/// Failure while extracting a diagram from, or embedding it into, a container.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Text documents must be valid UTF-8.
    #[error("document is not valid UTF-8")]
    InvalidUtf8,

    /// The container holds no diagram payload.
    #[error("no embedded diagram found in {format} file")]
    MissingDiagram { format: &'static str },

    /// The container itself is broken (bad signature, truncated chunk, ...).
    #[error("malformed {format} file: {reason}")]
    Malformed {
        format: &'static str,
        reason: String,
    },

    /// Embedding needs an existing rendered image to write into.
    #[error("cannot embed a diagram into an empty {format} file")]
    EmptyContainer { format: &'static str },
}

/// Failure talking to an embedded diagram tool.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WebviewError {
    #[error("webview did not respond within {0} ms")]
    Timeout(u128),

    #[error("webview is closed")]
    Closed,

    /// The tool answered the request with an error message.
    #[error("webview reported an error: {0}")]
    Remote(String),

    #[error("unexpected response from webview: expected {expected}")]
    UnexpectedResponse { expected: &'static str },

    #[error("invalid payload from webview: {0}")]
    InvalidPayload(String),
}

/// Failure of an editor lifecycle operation.
#[derive(Debug, Error)]
pub enum EditorError {
    /// The binary provider allows one editor per document.
    #[error("{} is already open in another editor", .0.display())]
    AlreadyOpen(PathBuf),

    /// No provider handles this file name.
    #[error("unsupported diagram file: {}", .0.display())]
    UnsupportedFile(PathBuf),

    #[error("unknown editor {0}")]
    UnknownEditor(EditorId),

    #[error("editor {0} is closed")]
    Closed(EditorId),

    /// Another save/convert/export is still waiting on the webview.
    #[error("editor {id} is busy ({operation})")]
    Busy { id: EditorId, operation: &'static str },

    #[error("document is already a {0} file")]
    SameFormat(&'static str),

    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Webview(#[from] WebviewError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EditorError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure reading or writing the settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to write settings {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("settings watcher error: {0}")]
    Watch(#[from] notify::Error),
}
