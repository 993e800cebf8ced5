use super::{IoError, read_header_token, split_header};
use crate::core::models::distance_table::DistanceTable;
use std::path::Path;
use tracing::debug;

/// Read a target distance table.
///
/// The plain format is a header of non-numeric lines followed by
/// whitespace-separated positive doubles.  The two-column PWA format is
/// auto-detected from a `resolution` header key; its rows are
/// `distance multiplicity` pairs and the resolution is retained on the
/// returned table.
pub fn read_distance_file(path: &Path) -> Result<DistanceTable, IoError> {
    let label = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|source| IoError::Read {
        path: label.clone(),
        source,
    })?;
    parse_distances(&text, &label)
}

pub fn parse_distances(text: &str, path_label: &str) -> Result<DistanceTable, IoError> {
    let (header, data) = split_header(text);
    let resolution = read_header_token::<f64>(&header, "resolution");
    let values = match resolution {
        Some(_) => parse_pwa_rows(data, path_label)?,
        None => parse_plain(data, path_label)?,
    };
    let mut table = DistanceTable::new(values).map_err(|source| IoError::InvalidTable {
        path: path_label.to_string(),
        source,
    })?;
    if let Some(res) = resolution {
        table.set_resolution(res);
    }
    debug!(
        path = path_label,
        distances = table.len(),
        pwa = resolution.is_some(),
        "distance table loaded"
    );
    Ok(table)
}

fn parse_plain(data: &str, path_label: &str) -> Result<Vec<f64>, IoError> {
    data.split_whitespace()
        .map(|token| {
            token.parse::<f64>().map_err(|_| IoError::BadNumber {
                path: path_label.to_string(),
                token: token.to_string(),
            })
        })
        .collect()
}

fn parse_pwa_rows(data: &str, path_label: &str) -> Result<Vec<f64>, IoError> {
    let numbers = parse_plain(data, path_label)?;
    if numbers.len() % 2 != 0 {
        return Err(IoError::IncompleteData {
            path: path_label.to_string(),
        });
    }
    let mut values = Vec::new();
    for row in numbers.chunks_exact(2) {
        let multiplicity = row[1].round() as usize;
        values.extend(std::iter::repeat_n(row[0], multiplicity));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_format_skips_header_lines() {
        let text = "# distances for a triangle\ntitle line\n1.0 1.0\n1.0\n";
        let table = parse_distances(text, "test.dst").unwrap();
        assert_eq!(table.as_slice(), &[1.0, 1.0, 1.0]);
        assert_eq!(table.resolution(), None);
    }

    #[test]
    fn pwa_format_expands_multiplicities() {
        let text = "resolution = 0.01\n1.5 2\n2.5 1\n";
        let table = parse_distances(text, "test.pwa").unwrap();
        assert_eq!(table.as_slice(), &[1.5, 1.5, 2.5]);
        assert_eq!(table.resolution(), Some(0.01));
    }

    #[test]
    fn pwa_with_odd_column_count_is_incomplete() {
        let text = "resolution = 0.01\n1.5 2 2.5\n";
        assert!(matches!(
            parse_distances(text, "test.pwa"),
            Err(IoError::IncompleteData { .. })
        ));
    }

    #[test]
    fn bad_token_reports_file_name() {
        let text = "1.0 oops 2.0\n";
        match parse_distances(text, "bad.dst") {
            Err(IoError::BadNumber { path, token }) => {
                assert_eq!(path, "bad.dst");
                assert_eq!(token, "oops");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn empty_data_is_an_invalid_table() {
        assert!(matches!(
            parse_distances("# only a header\n", "empty.dst"),
            Err(IoError::InvalidTable { .. })
        ));
    }
}
