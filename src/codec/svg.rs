//! `.drawio.svg` files: the diagram XML lives HTML-escaped in the `content`
//! attribute of the root `<svg>` element.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CodecError;

const FORMAT: &str = ".drawio.svg";

static SVG_ROOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<svg\b[^>]*>").expect("svg root pattern"));

static CONTENT_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\scontent\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("content attribute pattern")
});

pub fn decode(bytes: &[u8]) -> Result<String, CodecError> {
    let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
    if text.trim().is_empty() {
        return Ok(String::new());
    }

    let root = SVG_ROOT.find(text).ok_or_else(|| CodecError::Malformed {
        format: FORMAT,
        reason: "missing <svg> root element".to_string(),
    })?;

    let captures = CONTENT_ATTR
        .captures(root.as_str())
        .ok_or(CodecError::MissingDiagram { format: FORMAT })?;
    let value = captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| m.as_str())
        .unwrap_or_default();

    Ok(unescape(value))
}

pub fn encode(container: &[u8], diagram: &str) -> Result<Vec<u8>, CodecError> {
    if container.iter().all(u8::is_ascii_whitespace) {
        return Err(CodecError::EmptyContainer { format: FORMAT });
    }
    if decode(container).as_deref() == Ok(diagram) {
        return Ok(container.to_vec());
    }

    let text = std::str::from_utf8(container).map_err(|_| CodecError::InvalidUtf8)?;
    let root = SVG_ROOT.find(text).ok_or_else(|| CodecError::Malformed {
        format: FORMAT,
        reason: "missing <svg> root element".to_string(),
    })?;
    let attribute = format!(" content=\"{}\"", escape(diagram));

    let mut out = String::with_capacity(text.len() + attribute.len());
    match CONTENT_ATTR.find(root.as_str()) {
        Some(existing) => {
            let start = root.start() + existing.start();
            let end = root.start() + existing.end();
            out.push_str(&text[..start]);
            out.push_str(&attribute);
            out.push_str(&text[end..]);
        }
        None => {
            let at = root.start() + "<svg".len();
            out.push_str(&text[..at]);
            out.push_str(&attribute);
            out.push_str(&text[at..]);
        }
    }

    Ok(out.into_bytes())
}

/// Escape text for use inside a double-quoted attribute.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + value.len() / 8);
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(c),
        }
    }
    out
}

/// Resolve the named and numeric character references found in attribute values.
/// Unknown references are kept verbatim.
pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let resolved = rest
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| resolve_entity(&rest[1..semi]).map(|c| (c, semi)));

        match resolved {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}
