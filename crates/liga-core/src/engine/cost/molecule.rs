use super::PenaltyKind;
use crate::core::constants::{EPS_COST, EPS_DISTANCE};
use crate::core::models::atom::Atom;
use crate::core::models::distance_table::DistanceTable;
use nalgebra::{Point3, Vector3};

/// Cost of a candidate atom position against the current molecule.
///
/// Each existing atom is paired with the nearest still-unclaimed entry of a
/// scratch view over the working distance table, so a single target
/// distance cannot satisfy two candidate pairs within one evaluation.
/// Distances are claimed only when the mismatch is inside `tol_dd`; those
/// are the indices later consumed from the table by `Molecule::add_atom`.
///
/// The evaluator also produces the residual vector and analytic Jacobian
/// used by the least-squares relaxation, and supports a cutoff with a
/// self-tightening range so candidate screening can abandon hopeless
/// positions after a prefix of the atom list.
pub struct AtomCost<'a> {
    atoms: &'a [Atom],
    table: &'a DistanceTable,
    penalty: PenaltyKind,
    tol_dd: f64,
    cutoff: f64,
    cutoff_range: f64,
    lowest_cost: f64,
    total: f64,
    complete: bool,
    partials: Vec<f64>,
    used_distances: Vec<usize>,
    used_atoms: Vec<usize>,
    residuals: Vec<f64>,
    jacobian: Vec<Vector3<f64>>,
    claimed: Vec<bool>,
    claimed_count: usize,
}

impl<'a> AtomCost<'a> {
    pub fn new(
        atoms: &'a [Atom],
        table: &'a DistanceTable,
        penalty: PenaltyKind,
        tol_dd: f64,
    ) -> Self {
        Self {
            atoms,
            table,
            penalty,
            tol_dd,
            cutoff: f64::INFINITY,
            cutoff_range: f64::INFINITY,
            lowest_cost: f64::INFINITY,
            total: 0.0,
            complete: true,
            partials: Vec::new(),
            used_distances: Vec::new(),
            used_atoms: Vec::new(),
            residuals: Vec::new(),
            jacobian: Vec::new(),
            claimed: Vec::new(),
            claimed_count: 0,
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

    pub fn eval(&mut self, position: &Point3<f64>) -> f64 {
        self.total = 0.0;
        self.complete = true;
        self.partials.clear();
        self.used_distances.clear();
        self.used_atoms.clear();
        self.residuals.clear();
        self.jacobian.clear();
        self.claimed.clear();
        self.claimed.resize(self.table.len(), false);
        self.claimed_count = 0;
        let apply_cutoff = self.cutoff.is_finite();
        for (aidx, atom) in self.atoms.iter().enumerate() {
            let d = nalgebra::distance(&atom.position, position);
            let Some(tidx) = self.nearest_unclaimed(d) else {
                break;
            };
            let d_target = self.table[tidx];
            let dd = d_target - d;
            let pair_cost = self.penalty.eval(dd, self.tol_dd);
            if dd.abs() < self.tol_dd {
                self.claimed[tidx] = true;
                self.claimed_count += 1;
                self.used_distances.push(tidx);
                self.used_atoms.push(aidx);
            }
            self.partials.push(pair_cost);
            self.total += pair_cost;
            self.residuals.push(d - d_target);
            self.jacobian
                .push((position - atom.position) / d.max(EPS_DISTANCE));
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

    /// The evaluation visited every atom; false after a cutoff exit.
    pub fn complete(&self) -> bool {
        self.complete
    }

    /// Per-pair costs, parallel to the atom iteration order.
    pub fn partial_costs(&self) -> &[f64] {
        &self.partials
    }

    /// Indices into the working table of the distances this candidate
    /// would consume.
    pub fn used_distance_indices(&self) -> &[usize] {
        &self.used_distances
    }

    /// Atom indices paired with `used_distance_indices`.
    pub fn used_atom_indices(&self) -> &[usize] {
        &self.used_atoms
    }

    pub fn residuals(&self) -> &[f64] {
        &self.residuals
    }

    pub fn jacobian(&self) -> &[Vector3<f64>] {
        &self.jacobian
    }

    fn nearest_unclaimed(&self, d: f64) -> Option<usize> {
        let n = self.table.len();
        if self.claimed_count == n {
            return None;
        }
        let idx = self.table.find_nearest(d);
        if !self.claimed[idx] {
            return Some(idx);
        }
        let left = (0..idx).rev().find(|&i| !self.claimed[i]);
        let right = (idx + 1..n).find(|&i| !self.claimed[i]);
        match (left, right) {
            (Some(l), Some(r)) => {
                if d - self.table[l] <= self.table[r] - d {
                    Some(l)
                } else {
                    Some(r)
                }
            }
            (Some(l), None) => Some(l),
            (None, r) => r,
        }
    }
}
