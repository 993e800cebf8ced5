//! Text formats: distance tables, XYZ structures, AtomEye exports.

pub mod atomeye;
pub mod distances;
pub mod xyz;

use crate::core::models::distance_table::DistanceTableError;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unable to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to write to '{path}'")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: invalid number '{token}'")]
    BadNumber { path: String, token: String },

    #[error("{path}: expected {expected} atoms, read {actual}")]
    AtomCountMismatch {
        path: String,
        expected: usize,
        actual: usize,
    },

    #[error("{path}: incomplete data")]
    IncompleteData { path: String },

    #[error("{path}: {source}")]
    InvalidTable {
        path: String,
        #[source]
        source: DistanceTableError,
    },
}

/// Output format selector for structure files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureFormat {
    Xyz,
    RawXyz,
    AtomEye,
}

impl FromStr for StructureFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xyz" => Ok(StructureFormat::Xyz),
            "rawxyz" => Ok(StructureFormat::RawXyz),
            "atomeye" => Ok(StructureFormat::AtomEye),
            other => Err(format!("unknown structure format '{other}'")),
        }
    }
}

/// Split file text into the header (leading lines that do not start with a
/// number) and the data lines that follow.
pub(crate) fn split_header(text: &str) -> (String, &str) {
    let mut header = String::new();
    let mut rest = text;
    for line in text.lines() {
        let starts_numeric = line
            .split_whitespace()
            .next()
            .is_some_and(|tok| tok.parse::<f64>().is_ok());
        if starts_numeric {
            break;
        }
        header.push_str(line);
        header.push('\n');
        let consumed = line.as_ptr() as usize - text.as_ptr() as usize + line.len();
        rest = &text[consumed..];
    }
    if header.is_empty() { (header, text) } else { (header, rest) }
}

/// Look up `token` in a header and parse the value following the
/// `:`/`=`/space separators.
pub(crate) fn read_header_token<T: FromStr>(header: &str, token: &str) -> Option<T> {
    let start = header.find(token)? + token.len();
    let tail = header[start..].trim_start_matches([':', '=', ' ', '\t']);
    let value = tail.split_whitespace().next()?;
    value.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_header_separates_comment_lines() {
        let text = "# some header\n# NAtoms = 2\n1.0 2.0\n3.0\n";
        let (header, rest) = split_header(text);
        assert!(header.contains("NAtoms"));
        assert_eq!(rest.trim(), "1.0 2.0\n3.0".trim_end());
    }

    #[test]
    fn split_header_handles_headerless_text() {
        let text = "1.0 2.0 3.0\n";
        let (header, rest) = split_header(text);
        assert!(header.is_empty());
        assert_eq!(rest, text);
    }

    #[test]
    fn header_token_parsing() {
        let header = "# LIGA molecule format = xyz\n# NAtoms = 12\n";
        assert_eq!(
            read_header_token::<String>(header, "LIGA molecule format").as_deref(),
            Some("xyz")
        );
        assert_eq!(read_header_token::<usize>(header, "NAtoms"), Some(12));
        assert_eq!(read_header_token::<usize>(header, "missing"), None);
    }

    #[test]
    fn structure_format_from_str() {
        assert_eq!("xyz".parse(), Ok(StructureFormat::Xyz));
        assert_eq!("atomeye".parse(), Ok(StructureFormat::AtomEye));
        assert!("pdb".parse::<StructureFormat>().is_err());
    }
}
