//! ARBOR Codecs
//!
//! Lossless encodings of [`Node`](arbor_core::Node) trees:
//! - a compact, self-describing binary form (postcard) used on the wire
//!   and in message logs,
//! - an XML text form used for snapshots, files and the console,
//! - length-prefixed framing for append-only record files.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod binary;
pub mod error;
pub mod format;
pub mod frame;
pub mod xml;

pub use binary::{Wire, decode, encode, from_bytes, to_bytes};
pub use error::{CodecError, CodecResult};
pub use format::Format;
pub use frame::{FrameReader, FrameWriter, MAX_FRAME_LEN};
pub use xml::{from_xml, to_xml, to_xml_pretty};
