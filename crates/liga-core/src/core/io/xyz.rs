use super::{IoError, read_header_token, split_header};
use crate::core::models::atom::Atom;
use nalgebra::Point3;
use std::io::Write;
use std::path::Path;

/// Parse an XYZ structure.
///
/// A `LIGA molecule format = xyz` header (legacy `BGA molecule format`
/// accepted) with an `NAtoms` count is checked against the data when
/// present; headerless raw coordinates are also accepted.
pub fn parse_xyz(text: &str, path_label: &str) -> Result<Vec<Point3<f64>>, IoError> {
    let (header, data) = split_header(text);
    let declared: Option<usize> = if header_declares_xyz(&header) {
        read_header_token(&header, "NAtoms")
    } else {
        None
    };
    let mut numbers = Vec::new();
    for token in data.split_whitespace() {
        let value: f64 = token.parse().map_err(|_| IoError::BadNumber {
            path: path_label.to_string(),
            token: token.to_string(),
        })?;
        numbers.push(value);
    }
    if numbers.len() % 3 != 0 {
        return Err(IoError::IncompleteData {
            path: path_label.to_string(),
        });
    }
    let actual = numbers.len() / 3;
    if let Some(expected) = declared {
        if expected != actual {
            return Err(IoError::AtomCountMismatch {
                path: path_label.to_string(),
                expected,
                actual,
            });
        }
    }
    Ok(numbers
        .chunks_exact(3)
        .map(|row| Point3::new(row[0], row[1], row[2]))
        .collect())
}

pub fn read_xyz_file(path: &Path) -> Result<Vec<Point3<f64>>, IoError> {
    let label = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|source| IoError::Read {
        path: label.clone(),
        source,
    })?;
    parse_xyz(&text, &label)
}

fn header_declares_xyz(header: &str) -> bool {
    let fmt: Option<String> = read_header_token(header, "LIGA molecule format")
        .or_else(|| read_header_token(header, "BGA molecule format"));
    fmt.as_deref() == Some("xyz")
}

pub fn write_xyz<W: Write>(out: &mut W, atoms: &[Atom]) -> std::io::Result<()> {
    writeln!(out, "# LIGA molecule format = xyz")?;
    writeln!(out, "# NAtoms = {}", atoms.len())?;
    write_coordinates(out, atoms)
}

/// Bare tab-separated coordinates with no header.
pub fn write_rawxyz<W: Write>(out: &mut W, atoms: &[Atom]) -> std::io::Result<()> {
    write_coordinates(out, atoms)
}

fn write_coordinates<W: Write>(out: &mut W, atoms: &[Atom]) -> std::io::Result<()> {
    for atom in atoms {
        writeln!(
            out,
            "{}\t{}\t{}",
            atom.position.x, atom.position.y, atom.position.z
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_atoms() -> Vec<Atom> {
        vec![
            Atom::at(0.0, 0.0, 0.0),
            Atom::at(1.25, -0.5, 0.125),
            Atom::at(-2.0, 3.5, 7.0),
        ]
    }

    #[test]
    fn write_then_parse_preserves_coordinates() {
        let atoms = sample_atoms();
        let mut buffer = Vec::new();
        write_xyz(&mut buffer, &atoms).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("# LIGA molecule format = xyz\n# NAtoms = 3\n"));
        let positions = parse_xyz(&text, "roundtrip.xyz").unwrap();
        assert_eq!(positions.len(), 3);
        for (atom, pos) in atoms.iter().zip(&positions) {
            assert!((atom.position - pos).norm() < 1e-12);
        }
    }

    #[test]
    fn legacy_bga_header_is_accepted() {
        let text = "# BGA molecule format = xyz\n# NAtoms = 1\n0.5\t0.5\t0.5\n";
        let positions = parse_xyz(text, "legacy.xyz").unwrap();
        assert_eq!(positions, vec![Point3::new(0.5, 0.5, 0.5)]);
    }

    #[test]
    fn headerless_raw_coordinates_are_accepted() {
        let positions = parse_xyz("1 2 3\n4 5 6\n", "raw.xyz").unwrap();
        assert_eq!(positions.len(), 2);
    }

    #[test]
    fn atom_count_mismatch_names_the_file() {
        let text = "# LIGA molecule format = xyz\n# NAtoms = 5\n1 2 3\n";
        match parse_xyz(text, "short.xyz") {
            Err(IoError::AtomCountMismatch {
                path,
                expected,
                actual,
            }) => {
                assert_eq!(path, "short.xyz");
                assert_eq!(expected, 5);
                assert_eq!(actual, 1);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn trailing_partial_row_is_incomplete() {
        assert!(matches!(
            parse_xyz("1 2 3 4\n", "bad.xyz"),
            Err(IoError::IncompleteData { .. })
        ));
    }
}
