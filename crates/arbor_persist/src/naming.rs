//! Data file names: `<prefix>-<seq>-<timestamp>.<ext>`.

use arbor_codec::Format;
use chrono::{DateTime, Utc};

const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S";
const LOG_EXTENSION: &str = "log";

/// What a data file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Whole-tree snapshot
    Snapshot(Format),
    /// Message log
    Log,
}

impl FileKind {
    fn extension(&self) -> &'static str {
        match self {
            FileKind::Snapshot(format) => format.extension(),
            FileKind::Log => LOG_EXTENSION,
        }
    }
}

/// Name of a data file
#[must_use]
pub fn file_name(prefix: &str, seq: u64, at: DateTime<Utc>, kind: FileKind) -> String {
    format!("{}-{:06}-{}.{}", prefix, seq, at.format(STAMP_FORMAT), kind.extension())
}

/// Sequence number and kind of a data file belonging to `prefix`
#[must_use]
pub fn parse_file_name(prefix: &str, name: &str) -> Option<(u64, FileKind)> {
    let rest = name.strip_prefix(prefix)?.strip_prefix('-')?;
    let (stem, ext) = rest.rsplit_once('.')?;
    let (seq, stamp) = stem.split_once('-')?;
    if seq.is_empty() || !seq.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    chrono::NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()?;

    let kind = if ext == LOG_EXTENSION {
        FileKind::Log
    } else {
        FileKind::Snapshot(Format::from_extension(ext)?)
    };
    Some((seq.parse().ok()?, kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_names() {
        assert_eq!(
            file_name("arbor", 12, at(), FileKind::Snapshot(Format::Xml)),
            "arbor-000012-20240309T140507.xml"
        );
        assert_eq!(file_name("arbor", 1, at(), FileKind::Log), "arbor-000001-20240309T140507.log");
    }

    #[test]
    fn test_parse() {
        let name = file_name("arbor", 42, at(), FileKind::Snapshot(Format::Binary));
        assert_eq!(parse_file_name("arbor", &name), Some((42, FileKind::Snapshot(Format::Binary))));
        assert_eq!(
            parse_file_name("arbor", "arbor-000003-20240309T140507.log"),
            Some((3, FileKind::Log))
        );
    }

    #[test]
    fn test_foreign_files_ignored() {
        assert_eq!(parse_file_name("arbor", "other-000001-20240309T140507.xml"), None);
        assert_eq!(parse_file_name("arbor", "arbor-x-20240309T140507.xml"), None);
        assert_eq!(parse_file_name("arbor", "arbor-000001-yesterday.xml"), None);
        assert_eq!(parse_file_name("arbor", "arbor-000001-20240309T140507.txt"), None);
        assert_eq!(parse_file_name("arbor", "arbor-000001-20240309T140507.xml.tmp"), None);
    }
}
