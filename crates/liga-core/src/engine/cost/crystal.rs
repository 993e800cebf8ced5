use super::PenaltyKind;
use crate::core::constants::{EPS_COST, EPS_DISTANCE};
use crate::core::models::atom::Atom;
use crate::core::models::distance_table::DistanceTable;
use crate::core::models::lattice::{Lattice, PointsInSphere};
use nalgebra::{Point3, Vector3};

/// Periodic pair cost of a candidate position in a crystal.
///
/// Every atom pair is expanded through the lattice translations whose
/// length fits inside `rmax` extended by the longest cell diagonal;
/// image distances up to `rmax` are scored against the full (cropped,
/// never consumed) distance table.  The self cost scores one atom against
/// its own periodic images and is shared by every atom of the crystal.
pub struct AtomCostCrystal<'a> {
    atoms: &'a [Atom],
    table: &'a DistanceTable,
    penalty: PenaltyKind,
    tol_dd: f64,
    rmax: f64,
    sphere: PointsInSphere,
    cutoff: f64,
    cutoff_range: f64,
    lowest_cost: f64,
    total: f64,
    total_pairs: usize,
    complete: bool,
    partials: Vec<f64>,
    pair_counts: Vec<usize>,
    residuals: Vec<f64>,
    jacobian: Vec<Vector3<f64>>,
}

impl<'a> AtomCostCrystal<'a> {
    pub fn new(
        atoms: &'a [Atom],
        table: &'a DistanceTable,
        lattice: &'a Lattice,
        penalty: PenaltyKind,
        tol_dd: f64,
        rmax: f64,
    ) -> Self {
        // wrapped positions may sit anywhere in the cell, so the
        // translation search extends past rmax by the cell diameter
        let reach = rmax + lattice.max_ucell_diagonal();
        let sphere = PointsInSphere::new(0.0, reach, lattice);
        Self {
            atoms,
            table,
            penalty,
            tol_dd,
            rmax,
            sphere,
            cutoff: f64::INFINITY,
            cutoff_range: f64::INFINITY,
            lowest_cost: f64::INFINITY,
            total: 0.0,
            total_pairs: 0,
            complete: true,
            partials: Vec::new(),
            pair_counts: Vec::new(),
            residuals: Vec::new(),
            jacobian: Vec::new(),
        }
    }

    pub fn set_cutoff(&mut self, hi: f64) {
        self.cutoff = hi;
    }

    pub fn set_cutoff_range(&mut self, range: f64) {
        self.cutoff_range = range;
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Cost and image-pair count of a single pair separation `dd`.
    pub fn pair_cost_count(&self, dd: &Vector3<f64>) -> (f64, usize) {
        let mut cost = 0.0;
        let mut count = 0;
        for shift in self.sphere.iter() {
            let d_img = (dd + shift).norm();
            if d_img > self.rmax {
                continue;
            }
            let nearest = self.table[self.table.find_nearest(d_img)];
            cost += self.penalty.eval(nearest - d_img, self.tol_dd);
            count += 1;
        }
        (cost, count)
    }

    /// Cost and pair count of one atom against its own periodic images.
    /// The translations come in +-L pairs that describe the same image
    /// pair, hence the halving.
    pub fn self_cost_count(&self) -> (f64, usize) {
        let mut cost = 0.0;
        let mut count = 0;
        for shift in self.sphere.iter() {
            let r = shift.norm();
            if r < EPS_DISTANCE || r > self.rmax {
                continue;
            }
            let nearest = self.table[self.table.find_nearest(r)];
            cost += self.penalty.eval(nearest - r, self.tol_dd);
            count += 1;
        }
        (cost / 2.0, count / 2)
    }

    pub fn eval(&mut self, position: &Point3<f64>) -> f64 {
        self.total = 0.0;
        self.total_pairs = 0;
        self.complete = true;
        self.partials.clear();
        self.pair_counts.clear();
        self.residuals.clear();
        self.jacobian.clear();
        let apply_cutoff = self.cutoff.is_finite();
        for atom in self.atoms {
            let dd = atom.position - position;
            let mut pair_cost = 0.0;
            let mut pair_count = 0;
            for shift in self.sphere.iter() {
                let image = dd + shift;
                let d_img = image.norm();
                if d_img > self.rmax {
                    continue;
                }
                let nearest = self.table[self.table.find_nearest(d_img)];
                pair_cost += self.penalty.eval(nearest - d_img, self.tol_dd);
                pair_count += 1;
                self.residuals.push(d_img - nearest);
                self.jacobian.push(-image / d_img.max(EPS_DISTANCE));
            }
            self.partials.push(pair_cost);
            self.pair_counts.push(pair_count);
            self.total += pair_cost;
            self.total_pairs += pair_count;
            if apply_cutoff && self.total > self.cutoff {
                self.complete = false;
                break;
            }
        }
        if self.total < EPS_COST {
            self.total = 0.0;
        }
        if self.complete && self.total < self.lowest_cost {
            self.lowest_cost = self.total;
            self.cutoff = self.cutoff.min(self.lowest_cost + self.cutoff_range);
        }
        self.total
    }

    pub fn total_cost(&self) -> f64 {
        self.total
    }

    pub fn total_pair_count(&self) -> usize {
        self.total_pairs
    }

    pub fn complete(&self) -> bool {
        self.complete
    }

    pub fn partial_costs(&self) -> &[f64] {
        &self.partials
    }

    pub fn pair_counts(&self) -> &[usize] {
        &self.pair_counts
    }

    pub fn residuals(&self) -> &[f64] {
        &self.residuals
    }

    pub fn jacobian(&self) -> &[Vector3<f64>] {
        &self.jacobian
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bcc_table() -> DistanceTable {
        DistanceTable::new(vec![0.75f64.sqrt(), 1.0]).unwrap()
    }

    #[test]
    fn bcc_pair_images_are_exact() {
        let lattice = Lattice::default();
        let table = bcc_table();
        let corner = [Atom::at(0.0, 0.0, 0.0)];
        let eval = AtomCostCrystal::new(&corner, &table, &lattice, PenaltyKind::Pow2, 0.1, 1.1);
        let (cost, count) = eval.pair_cost_count(&Vector3::new(0.5, 0.5, 0.5));
        // eight body-centre images at sqrt(3)/2
        assert_eq!(count, 8);
        assert!(cost < 1e-12);
    }

    #[test]
    fn cubic_self_cost_counts_half_the_images() {
        let lattice = Lattice::default();
        let table = bcc_table();
        let atoms: [Atom; 0] = [];
        let eval = AtomCostCrystal::new(&atoms, &table, &lattice, PenaltyKind::Pow2, 0.1, 1.1);
        let (cost, count) = eval.self_cost_count();
        // six unit translations, halved to three distinct pairs
        assert_eq!(count, 3);
        assert!(cost < 1e-12);
    }

    #[test]
    fn eval_scores_candidate_against_all_atoms() {
        let lattice = Lattice::default();
        let table = bcc_table();
        let atoms = [Atom::at(0.0, 0.0, 0.0)];
        let mut eval =
            AtomCostCrystal::new(&atoms, &table, &lattice, PenaltyKind::Pow2, 0.1, 1.1);
        let perfect = eval.eval(&Point3::new(0.5, 0.5, 0.5));
        assert_eq!(perfect, 0.0);
        assert_eq!(eval.total_pair_count(), 8);
        let shifted = eval.eval(&Point3::new(0.45, 0.5, 0.5));
        assert!(shifted > 0.0);
        assert_eq!(eval.residuals().len(), eval.total_pair_count());
    }
}
