//! Diagram Containers
//!
//! Extraction and embedding of draw.io diagram XML for each supported file
//! format. Codecs only move bytes around: the diagram XML itself is opaque.
//!
//! Every codec guarantees that `encode(original, decode(original))` returns
//! `original` unchanged, so a no-op open/save cycle is byte-identical.

pub mod png;
pub mod svg;
pub mod xml;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// File formats an editor can hold open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagramFormat {
    /// Plain diagram XML (`.drawio`, `.dio`).
    #[serde(rename = ".drawio")]
    Drawio,
    /// Diagram XML in the `content` attribute of an SVG image.
    #[serde(rename = ".drawio.svg")]
    DrawioSvg,
    /// Diagram XML in a `tEXt` chunk of a PNG image.
    #[serde(rename = ".drawio.png")]
    DrawioPng,
}

impl DiagramFormat {
    /// Targets offered by the convert command.
    pub const ALL: [DiagramFormat; 3] = [Self::DrawioSvg, Self::Drawio, Self::DrawioPng];

    /// Detect the format from a file name. Compound extensions win over `.drawio`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".drawio.svg") || name.ends_with(".dio.svg") {
            Some(Self::DrawioSvg)
        } else if name.ends_with(".drawio.png") || name.ends_with(".dio.png") {
            Some(Self::DrawioPng)
        } else if name.ends_with(".drawio") || name.ends_with(".dio") {
            Some(Self::Drawio)
        } else {
            None
        }
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.extension() == extension)
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Drawio => ".drawio",
            Self::DrawioSvg => ".drawio.svg",
            Self::DrawioPng => ".drawio.png",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Drawio => "Converts the diagram to a drawio file",
            Self::DrawioSvg => "Converts the diagram to an editable SVG file",
            Self::DrawioPng => "Converts the diagram to an editable png file",
        }
    }

    /// PNG containers are not text and cannot live in a text document buffer.
    pub fn is_binary(self) -> bool {
        matches!(self, Self::DrawioPng)
    }

    /// Image containers need a rendering from the tool before XML can be embedded.
    pub fn needs_rendered_container(self) -> bool {
        !matches!(self, Self::Drawio)
    }

    pub fn decode(self, bytes: &[u8]) -> Result<String, CodecError> {
        match self {
            Self::Drawio => xml::decode(bytes),
            Self::DrawioSvg => svg::decode(bytes),
            Self::DrawioPng => png::decode(bytes),
        }
    }

    pub fn encode(self, container: &[u8], diagram: &str) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Drawio => xml::encode(container, diagram),
            Self::DrawioSvg => svg::encode(container, diagram),
            Self::DrawioPng => png::encode(container, diagram),
        }
    }

    /// Path of a sibling file with this format's extension swapped for `extension`.
    pub fn sibling_path(self, path: &Path, extension: &str) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = strip_suffix_ignore_case(&name, self.extension())
            .or_else(|| strip_suffix_ignore_case(&name, self.alias_extension()))
            .unwrap_or(&name);
        path.with_file_name(format!("{stem}{extension}"))
    }

    fn alias_extension(self) -> &'static str {
        match self {
            Self::Drawio => ".dio",
            Self::DrawioSvg => ".dio.svg",
            Self::DrawioPng => ".dio.png",
        }
    }
}

impl fmt::Display for DiagramFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Rendered outputs offered by the export command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExportFormat {
    #[serde(rename = ".svg")]
    Svg,
    #[serde(rename = ".png")]
    Png,
    #[serde(rename = ".drawio")]
    Drawio,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 3] = [Self::Svg, Self::Png, Self::Drawio];

    pub fn extension(self) -> &'static str {
        match self {
            Self::Svg => ".svg",
            Self::Png => ".png",
            Self::Drawio => ".drawio",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Svg => "Exports the diagram to a SVG file",
            Self::Png => "Exports the diagram to a png file",
            Self::Drawio => "Exports the diagram to a drawio file",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    if name.len() >= suffix.len() && name.is_char_boundary(name.len() - suffix.len()) {
        let (stem, tail) = name.split_at(name.len() - suffix.len());
        tail.eq_ignore_ascii_case(suffix).then_some(stem)
    } else {
        None
    }
}
