//! Plain `.drawio` files: the document is the diagram XML.

use crate::error::CodecError;

pub fn decode(bytes: &[u8]) -> Result<String, CodecError> {
    let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;

    // A freshly created file is empty; the tool starts with a blank diagram.
    let trimmed = text.trim_start_matches('\u{feff}').trim();
    if !trimmed.is_empty() && !trimmed.starts_with('<') {
        return Err(CodecError::Malformed {
            format: ".drawio",
            reason: "expected an XML document".to_string(),
        });
    }

    Ok(text.to_string())
}

pub fn encode(_container: &[u8], diagram: &str) -> Result<Vec<u8>, CodecError> {
    Ok(diagram.as_bytes().to_vec())
}
