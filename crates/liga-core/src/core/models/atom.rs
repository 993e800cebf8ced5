use nalgebra::Point3;

/// Geometric rule that generated an atom candidate: from one base atom
/// (Linear), two (Planar), or three (Spatial).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriangulationKind {
    Linear,
    Planar,
    Spatial,
}

impl TriangulationKind {
    pub const COUNT: usize = 3;
    pub const ALL: [TriangulationKind; 3] = [
        TriangulationKind::Linear,
        TriangulationKind::Planar,
        TriangulationKind::Spatial,
    ];

    pub fn index(self) -> usize {
        match self {
            TriangulationKind::Linear => 0,
            TriangulationKind::Planar => 1,
            TriangulationKind::Spatial => 2,
        }
    }
}

/// One atom owned by a structure.
///
/// The `slot` is the atom's stable pair-matrix index, assigned by the owning
/// structure on insertion and valid for the atom's whole lifetime there.
/// The badness accumulator carries a rolling sum and age so the average
/// badness over the atom's history is available to diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub position: Point3<f64>,
    pub slot: usize,
    pub fixed: bool,
    pub kind: TriangulationKind,
    badness: f64,
    badness_sum: f64,
    age: u64,
}

impl Atom {
    pub fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            slot: 0,
            fixed: false,
            kind: TriangulationKind::Linear,
            badness: 0.0,
            badness_sum: 0.0,
            age: 1,
        }
    }

    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self::new(Point3::new(x, y, z))
    }

    pub fn with_kind(position: Point3<f64>, kind: TriangulationKind) -> Self {
        Self {
            kind,
            ..Self::new(position)
        }
    }

    pub fn badness(&self) -> f64 {
        self.badness
    }

    /// Badness of a relaxable atom; fixed atoms report zero so they are
    /// never picked for relaxation or removal.
    pub fn free_badness(&self) -> f64 {
        if self.fixed { 0.0 } else { self.badness }
    }

    pub fn avg_badness(&self) -> f64 {
        if self.age == 0 {
            0.0
        } else {
            self.badness_sum / self.age as f64
        }
    }

    pub fn inc_badness(&mut self, db: f64) {
        self.badness += db;
        self.badness_sum += self.badness;
        self.age += 1;
    }

    pub fn dec_badness(&mut self, db: f64) {
        self.badness -= db;
        self.badness_sum += self.badness;
        self.age += 1;
    }

    pub fn reset_badness(&mut self) {
        self.badness = 0.0;
        self.badness_sum = 0.0;
        self.age = 1;
    }
}

/// Euclidean distance between two atom positions.
pub fn distance(a: &Atom, b: &Atom) -> f64 {
    nalgebra::distance(&a.position, &b.position)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn badness_accumulator_tracks_sum_and_age() {
        let mut a = Atom::at(0.0, 0.0, 0.0);
        assert_eq!(a.badness(), 0.0);
        a.inc_badness(2.0);
        a.inc_badness(1.0);
        assert_eq!(a.badness(), 3.0);
        assert!((a.avg_badness() - 5.0 / 3.0).abs() < 1e-12);
        a.dec_badness(3.0);
        assert_eq!(a.badness(), 0.0);
        a.reset_badness();
        assert_eq!(a.badness(), 0.0);
        assert_eq!(a.avg_badness(), 0.0);
    }

    #[test]
    fn fixed_atom_has_zero_free_badness() {
        let mut a = Atom::at(1.0, 0.0, 0.0);
        a.inc_badness(5.0);
        assert_eq!(a.free_badness(), 5.0);
        a.fixed = true;
        assert_eq!(a.free_badness(), 0.0);
    }

    #[test]
    fn distance_between_atoms() {
        let a = Atom::at(0.0, 0.0, 0.0);
        let b = Atom::at(3.0, 4.0, 0.0);
        assert!((distance(&a, &b) - 5.0).abs() < 1e-12);
    }
}
