//! Whole-tree snapshot files.
//!
//! XML snapshots hold a `<root>` document. Binary snapshots are sealed:
//!
//! ```text
//! "ARBS" | version (1 byte) | blake3(body) (32 bytes) | body
//! ```
//!
//! Both are written to a sibling `.tmp` file and renamed into place, so a
//! crash never leaves a half-written snapshot under its final name.

use crate::{PersistError, PersistResult};
use arbor_codec::Format;
use arbor_core::Node;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 4] = b"ARBS";
const VERSION: u8 = 1;
const HEADER_LEN: usize = MAGIC.len() + 1 + blake3::OUT_LEN;

/// Write `root` to `path` in `format`
///
/// # Errors
///
/// Returns `Codec` if the tree cannot be encoded or `Io` if the file
/// cannot be written
pub fn write_snapshot(path: &Path, root: &Node, format: Format) -> PersistResult<()> {
    let body = format.encode(root)?;
    let bytes = match format {
        Format::Xml => body,
        Format::Binary => seal(&body),
    };

    let tmp = temp_path(path);
    {
        let mut file = File::create(&tmp).map_err(|e| PersistError::io(&tmp, e))?;
        file.write_all(&bytes).map_err(|e| PersistError::io(&tmp, e))?;
        file.sync_all().map_err(|e| PersistError::io(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| PersistError::io(path, e))
}

/// Read a snapshot, choosing the decoder from the file extension
///
/// # Errors
///
/// Returns `Io` if unreadable, `ChecksumMismatch` for a damaged binary
/// body and `Corrupt` for anything that is not a dictionary tree
pub fn read_snapshot(path: &Path) -> PersistResult<Node> {
    let format = Format::from_path(path)
        .ok_or_else(|| PersistError::corrupt(path, "not a snapshot extension"))?;
    let bytes = fs::read(path).map_err(|e| PersistError::io(path, e))?;

    let body = match format {
        Format::Xml => bytes.as_slice(),
        Format::Binary => unseal(path, &bytes)?,
    };
    let root = format
        .decode(body)
        .map_err(|e| PersistError::corrupt(path, e))?;
    if !root.is_dict() {
        return Err(PersistError::corrupt(path, "snapshot root is not a dictionary"));
    }
    Ok(root.renamed(""))
}

fn seal(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.extend_from_slice(blake3::hash(body).as_bytes());
    out.extend_from_slice(body);
    out
}

fn unseal<'a>(path: &Path, bytes: &'a [u8]) -> PersistResult<&'a [u8]> {
    if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(PersistError::corrupt(path, "missing snapshot header"));
    }
    if bytes[MAGIC.len()] != VERSION {
        return Err(PersistError::corrupt(
            path,
            format!("unsupported snapshot version {}", bytes[MAGIC.len()]),
        ));
    }

    let (header, body) = bytes.split_at(HEADER_LEN);
    if &header[MAGIC.len() + 1..] != blake3::hash(body).as_bytes() {
        return Err(PersistError::ChecksumMismatch {
            path: path.display().to_string(),
        });
    }
    Ok(body)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Node {
        Node::root()
            .with_child(
                Node::dict("products")
                    .with_child(Node::dict("counter").with_child(Node::str("last_string", "3"))),
            )
            .with_child(
                Node::dict("jobs").with_child(Node::reference("output", "/products/counter")),
            )
    }

    #[test]
    fn test_roundtrip_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        for (name, format) in [("s.xml", Format::Xml), ("s.bin", Format::Binary)] {
            let path = dir.path().join(name);
            write_snapshot(&path, &tree(), format).unwrap();
            assert_eq!(read_snapshot(&path).unwrap(), tree());
            assert!(!temp_path(&path).exists());
        }
    }

    #[test]
    fn test_xml_snapshot_is_root_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.xml");
        write_snapshot(&path, &tree(), Format::Xml).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("<root>"));
    }

    #[test]
    fn test_flipped_bit_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.bin");
        write_snapshot(&path, &tree(), Format::Binary).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(read_snapshot(&path), Err(PersistError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_headerless_binary_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.bin");
        fs::write(&path, arbor_codec::encode(&tree()).unwrap()).unwrap();
        assert!(matches!(read_snapshot(&path), Err(PersistError::Corrupt { .. })));
    }

    #[test]
    fn test_leaf_root_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.xml");
        fs::write(&path, "<int name=\"n\">4</int>").unwrap();
        assert!(read_snapshot(&path).is_err());
    }
}
