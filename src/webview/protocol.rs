//! Webview Message Protocol
//!
//! JSON messages exchanged with the embedded diagram tool, tagged by `type`.
//! Requests that expect an answer carry a `requestId`; the matching response
//! echoes it. Everything else is fire-and-forget.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::codec::{DiagramFormat, ExportFormat};
use crate::config::Theme;
use crate::error::WebviewError;

/// Correlation id of a request/response pair
pub type RequestId = u64;

/// Options the tool receives before its first load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebviewOptions {
    pub retain_context_when_hidden: bool,
    pub code_link_activated: bool,
}

/// Host → webview
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HostMessage {
    Init { options: WebviewOptions },
    /// Replace the whole diagram
    Load { content: String, theme: Theme },
    SetTheme { theme: Theme },
    /// Ask for the current diagram XML
    GetContent { request_id: RequestId },
    Export { request_id: RequestId, format: ExportFormat },
    Convert { request_id: RequestId, format: DiagramFormat },
    /// Set the label of the selected node
    LinkSelectedNode { label: String },
}

impl HostMessage {
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::GetContent { request_id }
            | Self::Export { request_id, .. }
            | Self::Convert { request_id, .. } => Some(*request_id),
            _ => None,
        }
    }
}

/// Webview → host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WebviewMessage {
    /// The tool finished booting and accepts messages
    Ready,
    /// The diagram changed
    Autosave { content: String },
    /// The diagram changed and the user asked to save it
    Save { content: String },
    Content { request_id: RequestId, content: String },
    #[serde(rename = "export-result")]
    ExportResult { request_id: RequestId, content: String },
    #[serde(rename = "convert-result")]
    ConvertResult { request_id: RequestId, content: String },
    NodeSelected { label: Option<String> },
    Error {
        request_id: Option<RequestId>,
        message: String,
    },
}

/// Payload of a completed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Content(String),
    ExportResult(String),
    ConvertResult(String),
}

impl Reply {
    pub fn into_content(self) -> Result<String, WebviewError> {
        match self {
            Self::Content(content) => Ok(content),
            _ => Err(WebviewError::UnexpectedResponse {
                expected: "content",
            }),
        }
    }

    pub fn into_export(self) -> Result<String, WebviewError> {
        match self {
            Self::ExportResult(content) => Ok(content),
            _ => Err(WebviewError::UnexpectedResponse {
                expected: "export-result",
            }),
        }
    }

    pub fn into_convert(self) -> Result<String, WebviewError> {
        match self {
            Self::ConvertResult(content) => Ok(content),
            _ => Err(WebviewError::UnexpectedResponse {
                expected: "convert-result",
            }),
        }
    }
}

/// File bytes of an export/convert payload.
///
/// Binary results arrive as `data:<mime>;base64,<data>` URLs, text results as-is.
pub fn payload_bytes(content: &str) -> Result<Vec<u8>, WebviewError> {
    let Some(url) = content.strip_prefix("data:") else {
        return Ok(content.as_bytes().to_vec());
    };
    let (_, data) = url
        .split_once(";base64,")
        .ok_or_else(|| WebviewError::InvalidPayload("data URL is not base64".to_string()))?;
    STANDARD
        .decode(data.trim())
        .map_err(|e| WebviewError::InvalidPayload(e.to_string()))
}

/// Wrap binary file bytes as a data URL, the inverse of [`payload_bytes`].
pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_host_message_wire_format() {
        let load = HostMessage::Load {
            content: "<mxfile/>".to_string(),
            theme: Theme::Kennedy,
        };
        assert_eq!(
            serde_json::to_value(&load).unwrap(),
            json!({"type": "load", "content": "<mxfile/>", "theme": "Kennedy"})
        );

        let convert = HostMessage::Convert {
            request_id: 7,
            format: DiagramFormat::DrawioPng,
        };
        assert_eq!(
            serde_json::to_value(&convert).unwrap(),
            json!({"type": "convert", "requestId": 7, "format": ".drawio.png"})
        );
        assert_eq!(convert.request_id(), Some(7));
    }

    #[test]
    fn test_webview_message_parsing() {
        let msg: WebviewMessage =
            serde_json::from_str(r#"{"type":"export-result","requestId":3,"content":"<svg/>"}"#)
                .unwrap();
        assert_eq!(
            msg,
            WebviewMessage::ExportResult {
                request_id: 3,
                content: "<svg/>".to_string()
            }
        );

        let ready: WebviewMessage = serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
        assert_eq!(ready, WebviewMessage::Ready);

        let error: WebviewMessage =
            serde_json::from_str(r#"{"type":"error","message":"boom"}"#).unwrap();
        assert_eq!(
            error,
            WebviewMessage::Error {
                request_id: None,
                message: "boom".to_string()
            }
        );
    }

    #[test]
    fn test_payload_bytes() {
        assert_eq!(payload_bytes("<svg/>").unwrap(), b"<svg/>");

        let url = data_url("image/png", &[1, 2, 3]);
        assert_eq!(payload_bytes(&url).unwrap(), vec![1, 2, 3]);
        assert!(payload_bytes("data:image/png,raw").is_err());
    }
}
