use crate::core::models::atom::Atom;
use std::io::Write;

// AtomEye refuses boxes smaller than this half-range.
const MIN_HALF_RANGE: f64 = 1.75;
const BOX_MARGIN: f64 = 1.01;

// Single-species export; AtomEye wants a mass and symbol per species.
const CARBON_MASS: f64 = 12.0111;
const CARBON_SYMBOL: &str = "C";

/// Write an AtomEye extended-CFG snapshot.
///
/// The orthorhombic `H0` box covers every coordinate with a 1% margin and
/// never shrinks below the AtomEye minimum of +-1.75; coordinates are
/// emitted fractional within that box, with per-atom badness as the fourth
/// auxiliary entry.
pub fn write_atomeye<W: Write>(out: &mut W, atoms: &[Atom]) -> std::io::Result<()> {
    let (lo, range) = bounding_box(atoms);
    writeln!(out, "# LIGA molecule format = atomeye")?;
    writeln!(out, "# NAtoms = {}", atoms.len())?;
    writeln!(out, "Number of particles = {}", atoms.len())?;
    writeln!(out, "A = 1.0 Angstrom (basic length-scale)")?;
    for i in 1..=3 {
        for j in 1..=3 {
            let value = if i == j { range } else { 0.0 };
            writeln!(out, "H0({i},{j}) = {value} A")?;
        }
    }
    writeln!(out, ".NO_VELOCITY.")?;
    writeln!(out, "entry_count = 4")?;
    writeln!(out, "auxiliary[0] = abad [au]")?;
    writeln!(out)?;
    writeln!(out, "{CARBON_MASS}")?;
    writeln!(out, "{CARBON_SYMBOL}")?;
    for atom in atoms {
        writeln!(
            out,
            "{} {} {} {}",
            (atom.position.x - lo) / range,
            (atom.position.y - lo) / range,
            (atom.position.z - lo) / range,
            atom.badness()
        )?;
    }
    Ok(())
}

fn bounding_box(atoms: &[Atom]) -> (f64, f64) {
    let mut lo = -MIN_HALF_RANGE;
    let mut hi = MIN_HALF_RANGE;
    for atom in atoms {
        for value in [atom.position.x, atom.position.y, atom.position.z] {
            lo = lo.min(BOX_MARGIN * value);
            hi = hi.max(BOX_MARGIN * value);
        }
    }
    (lo, hi - lo)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(atoms: &[Atom]) -> String {
        let mut buffer = Vec::new();
        write_atomeye(&mut buffer, atoms).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn small_structures_use_the_minimum_box() {
        let atoms = vec![Atom::at(0.0, 0.0, 0.0), Atom::at(0.5, 0.0, 0.0)];
        let text = render(&atoms);
        assert!(text.contains("Number of particles = 2"));
        assert!(text.contains("H0(1,1) = 3.5 A"));
        assert!(text.contains("H0(1,2) = 0 A"));
        assert!(text.contains("entry_count = 4"));
        assert!(text.contains("auxiliary[0] = abad [au]"));
        assert!(text.contains("12.0111"));
    }

    #[test]
    fn large_structures_grow_the_box_with_margin() {
        let atoms = vec![Atom::at(-4.0, 0.0, 0.0), Atom::at(4.0, 0.0, 0.0)];
        let text = render(&atoms);
        assert!(text.contains("H0(1,1) = 8.08"));
    }

    #[test]
    fn coordinates_are_fractional_within_the_box() {
        let atoms = vec![Atom::at(0.0, 0.0, 0.0)];
        let text = render(&atoms);
        let data_line = text.lines().last().unwrap();
        let cols: Vec<f64> = data_line
            .split_whitespace()
            .map(|t| t.parse().unwrap())
            .collect();
        assert_eq!(cols.len(), 4);
        for &c in &cols[..3] {
            assert!((c - 0.5).abs() < 1e-12, "origin maps to the box centre");
        }
        assert_eq!(cols[3], 0.0);
    }
}
