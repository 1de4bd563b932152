//! File format selection.

use crate::{CodecError, CodecResult, binary, xml};
use arbor_core::Node;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// On-disk encoding of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    /// Indented XML text
    #[default]
    Xml,
    /// Postcard binary
    Binary,
}

impl Format {
    /// File extension without the dot
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Format::Xml => "xml",
            Format::Binary => "bin",
        }
    }

    /// Format for a file extension
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "xml" => Some(Format::Xml),
            "bin" => Some(Format::Binary),
            _ => None,
        }
    }

    /// Format implied by a file name
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Encode a node in this format
    ///
    /// # Errors
    ///
    /// Propagates the underlying encoder's error
    pub fn encode(&self, node: &Node) -> CodecResult<Vec<u8>> {
        match self {
            Format::Xml => xml::to_xml_pretty(node).map(String::into_bytes),
            Format::Binary => binary::encode(node),
        }
    }

    /// Decode a node in this format
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if the bytes are not a valid encoding
    pub fn decode(&self, bytes: &[u8]) -> CodecResult<Node> {
        match self {
            Format::Xml => {
                let text = std::str::from_utf8(bytes).map_err(CodecError::xml)?;
                xml::from_xml(text)
            }
            Format::Binary => binary::decode(bytes),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Xml => write!(f, "xml"),
            Format::Binary => write!(f, "binary"),
        }
    }
}

impl FromStr for Format {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xml" => Ok(Format::Xml),
            "binary" | "bin" => Ok(Format::Binary),
            other => Err(CodecError::Malformed {
                format: "format name",
                reason: format!("unknown format '{}'", other),
            }),
        }
    }
}
