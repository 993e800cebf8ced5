use super::grown_matrix_size;
use crate::core::constants::{EPS_COST, EPS_DISTANCE};
use crate::core::models::atom::Atom;
use crate::core::models::distance_table::DistanceTable;
use crate::core::models::lattice::Lattice;
use crate::engine::config::FitParams;
use crate::engine::cost::AtomCostCrystal;
use crate::engine::error::{LigaError, Result};
use crate::engine::relax::relax_position;
use crate::engine::utils::sampling::{self, SamplingError};
use itertools::Itertools;
use nalgebra::{DMatrix, Point3, Vector3};
use rand::Rng;
use std::collections::BTreeSet;
use std::sync::Arc;

/// A periodic structure fitted against a radial distance set.
///
/// The full table holds the unique target distances and is shared
/// read-only between copies; the working table is its crop to `rmax` and
/// is never consumed, since every image pair may reuse any target
/// distance.  Pair matrices carry one extra piece of state over the
/// molecule: `pmx_pair_counts` with the number of image pairs behind each
/// cost entry, and non-zero diagonals holding the self cost every atom
/// shares by lattice symmetry.  Atom positions are canonicalised into the
/// unit cell on every mutation.
#[derive(Debug, Clone)]
pub struct Crystal {
    atoms: Vec<Atom>,
    lattice: Lattice,
    full_table: Arc<DistanceTable>,
    dtarget: DistanceTable,
    pmx_partial_costs: DMatrix<f64>,
    pmx_pair_counts: DMatrix<usize>,
    free_slots: BTreeSet<usize>,
    badness: f64,
    count_pairs: usize,
    rmax: f64,
    max_atom_count: usize,
    params: FitParams,
}

impl Crystal {
    pub fn new(
        target: &DistanceTable,
        lattice: Lattice,
        rmax: f64,
        max_atom_count: usize,
        params: FitParams,
    ) -> Result<Self> {
        if max_atom_count < 1 {
            return Err(LigaError::InvalidStructure(format!(
                "invalid max atom count {max_atom_count}"
            )));
        }
        let full_table = Arc::new(DistanceTable::new(target.unique())?);
        let mut crystal = Self {
            atoms: Vec::new(),
            lattice,
            full_table,
            dtarget: DistanceTable::default(),
            pmx_partial_costs: DMatrix::zeros(0, 0),
            pmx_pair_counts: DMatrix::zeros(0, 0),
            free_slots: BTreeSet::new(),
            badness: 0.0,
            count_pairs: 0,
            rmax,
            max_atom_count,
            params,
        };
        crystal.crop_distance_table()?;
        Ok(crystal)
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn max_atom_count(&self) -> usize {
        self.max_atom_count
    }

    pub fn full(&self) -> bool {
        self.atoms.len() >= self.max_atom_count
    }

    pub fn badness(&self) -> f64 {
        self.badness
    }

    /// Image pairs behind the current badness, diagonal self pairs
    /// included.
    pub fn count_pairs(&self) -> usize {
        self.count_pairs
    }

    pub fn params(&self) -> &FitParams {
        &self.params
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn distance_table(&self) -> &DistanceTable {
        &self.dtarget
    }

    pub fn effective_rmax(&self) -> f64 {
        if self.rmax > 0.0 {
            self.rmax
        } else {
            self.full_table.max_distance() + EPS_DISTANCE
        }
    }

    pub fn set_lattice(&mut self, lattice: Lattice) -> Result<()> {
        self.lattice = lattice;
        self.recalculate()
    }

    pub fn set_rmax(&mut self, rmax: f64) -> Result<()> {
        self.rmax = rmax;
        self.crop_distance_table()?;
        self.recalculate()
    }

    pub fn set_max_atom_count(&mut self, count: usize) -> Result<()> {
        if count < 1 || count < self.atoms.len() {
            return Err(LigaError::InvalidStructure(format!(
                "invalid max atom count {count}"
            )));
        }
        self.max_atom_count = count;
        Ok(())
    }

    pub fn add_position(&mut self, position: Point3<f64>) -> Result<()> {
        self.add_atom(Atom::new(position))
    }

    pub fn add_atom(&mut self, atom: Atom) -> Result<()> {
        if self.atoms.len() >= self.max_atom_count {
            return Err(LigaError::InvalidStructure(
                "crystal is already at its maximum atom count".into(),
            ));
        }
        let mut atom = atom;
        atom.reset_badness();
        atom.position = Point3::from(self.lattice.ucv_cartesian_adjusted(&atom.position.coords));
        atom.slot = self.alloc_slot();
        let slot = atom.slot;

        let mut eval = self.evaluator();
        eval.eval(&atom.position);
        let partials = eval.partial_costs().to_vec();
        let counts = eval.pair_counts().to_vec();
        let total = eval.total_cost();
        let total_pairs = eval.total_pair_count();
        let (diag_cost, diag_count) = if self.atoms.is_empty() {
            eval.self_cost_count()
        } else {
            let s0 = self.atoms[0].slot;
            (
                self.pmx_partial_costs[(s0, s0)],
                self.pmx_pair_counts[(s0, s0)],
            )
        };
        drop(eval);
        debug_assert_eq!(partials.len(), self.atoms.len());

        {
            let atoms = &mut self.atoms;
            let costs = &mut self.pmx_partial_costs;
            let pair_counts = &mut self.pmx_pair_counts;
            for (other, (&pair, &count)) in atoms.iter_mut().zip(partials.iter().zip(&counts)) {
                costs[(slot, other.slot)] = pair;
                costs[(other.slot, slot)] = pair;
                other.inc_badness(pair / 2.0);
                atom.inc_badness(pair / 2.0);
                pair_counts[(slot, other.slot)] = count;
                pair_counts[(other.slot, slot)] = count;
            }
        }
        self.badness += total;
        self.count_pairs += total_pairs;

        // every atom shares the same self cost by lattice symmetry
        self.pmx_partial_costs[(slot, slot)] = diag_cost;
        atom.inc_badness(diag_cost);
        self.badness += diag_cost;
        self.pmx_pair_counts[(slot, slot)] = diag_count;
        self.count_pairs += diag_count;

        if self.badness < EPS_COST {
            self.badness = 0.0;
        }
        self.atoms.push(atom);
        Ok(())
    }

    pub fn pop_atom(&mut self, index: usize) -> Result<Atom> {
        if index >= self.atoms.len() {
            return Err(LigaError::IndexOutOfRange {
                index,
                len: self.atoms.len(),
            });
        }
        debug_assert!(!self.atoms[index].fixed, "pop of a fixed atom");
        let atom = self.atoms.remove(index);
        let slot = atom.slot;
        let mut removed = self.pmx_partial_costs[(slot, slot)];
        self.count_pairs -= self.pmx_pair_counts[(slot, slot)];
        self.pmx_partial_costs[(slot, slot)] = 0.0;
        self.pmx_pair_counts[(slot, slot)] = 0;
        let mut removed_pairs = 0;
        {
            let atoms = &mut self.atoms;
            let costs = &mut self.pmx_partial_costs;
            let pair_counts = &mut self.pmx_pair_counts;
            for other in atoms.iter_mut() {
                let pair = costs[(slot, other.slot)];
                other.dec_badness(pair / 2.0);
                removed += pair;
                costs[(slot, other.slot)] = 0.0;
                costs[(other.slot, slot)] = 0.0;
                removed_pairs += pair_counts[(slot, other.slot)];
                pair_counts[(slot, other.slot)] = 0;
                pair_counts[(other.slot, slot)] = 0;
            }
        }
        self.count_pairs -= removed_pairs;
        self.badness -= removed;
        if self.badness < EPS_COST {
            self.badness = 0.0;
        }
        self.free_slots.insert(slot);
        Ok(atom)
    }

    pub fn fix_atom(&mut self, index: usize) -> Result<()> {
        if index >= self.atoms.len() {
            return Err(LigaError::IndexOutOfRange {
                index,
                len: self.atoms.len(),
            });
        }
        self.atoms[index].fixed = true;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.atoms.clear();
        self.free_slots.clear();
        self.pmx_partial_costs.fill(0.0);
        self.pmx_pair_counts.fill(0);
        self.badness = 0.0;
        self.count_pairs = 0;
    }

    /// Rebuild every cost entry from atom positions: the shared diagonal
    /// self cost first, then all off-diagonal image pair costs.
    pub fn recalculate(&mut self) -> Result<()> {
        self.badness = 0.0;
        self.count_pairs = 0;
        self.pmx_partial_costs.fill(0.0);
        self.pmx_pair_counts.fill(0);
        for atom in &mut self.atoms {
            atom.reset_badness();
        }
        if self.atoms.is_empty() {
            return Ok(());
        }
        let eval = AtomCostCrystal::new(
            &[],
            &self.dtarget,
            &self.lattice,
            self.params.penalty,
            self.params.tol_dd,
            self.effective_rmax(),
        );
        let (diag_cost, diag_count) = eval.self_cost_count();
        let slots: Vec<usize> = self.atoms.iter().map(|a| a.slot).collect();
        let positions: Vec<Point3<f64>> = self.atoms.iter().map(|a| a.position).collect();
        for (atom, &slot) in self.atoms.iter_mut().zip(&slots) {
            self.pmx_partial_costs[(slot, slot)] = diag_cost;
            self.pmx_pair_counts[(slot, slot)] = diag_count;
            atom.inc_badness(diag_cost);
            self.badness += diag_cost;
            self.count_pairs += diag_count;
        }
        let mut halves = vec![0.0; self.atoms.len()];
        for (i, j) in (0..positions.len()).tuple_combinations() {
            let dd = positions[j] - positions[i];
            let (cost, count) = eval.pair_cost_count(&dd);
            self.pmx_partial_costs[(slots[i], slots[j])] = cost;
            self.pmx_partial_costs[(slots[j], slots[i])] = cost;
            self.pmx_pair_counts[(slots[i], slots[j])] = count;
            self.pmx_pair_counts[(slots[j], slots[i])] = count;
            self.badness += cost;
            self.count_pairs += count;
            halves[i] += cost / 2.0;
            halves[j] += cost / 2.0;
        }
        for (atom, half) in self.atoms.iter_mut().zip(halves) {
            atom.inc_badness(half);
        }
        if self.badness < EPS_COST {
            self.badness = 0.0;
        }
        Ok(())
    }

    /// Refine an external atom's position against the periodic images of
    /// the current atoms.  Unlike the molecule case, even a single atom
    /// provides enough image-pair residuals to pin the position.
    pub fn relax_external(&self, atom: &mut Atom) {
        if self.atoms.is_empty() {
            return;
        }
        let mut eval = self.evaluator();
        let mut position = atom.position;
        relax_position(
            |p| {
                let cost = eval.eval(p);
                (cost, eval.residuals().to_vec(), eval.jacobian().to_vec())
            },
            &mut position,
        );
        atom.position = position;
    }

    pub(crate) fn screen_candidates(&self, vta: &mut Vec<Atom>, evolve_range: f64, hi_abad: f64) {
        let mut eval = self.evaluator();
        eval.set_cutoff(hi_abad);
        eval.set_cutoff_range(evolve_range);
        for candidate in vta.iter_mut() {
            let cost = eval.eval(&candidate.position);
            candidate.inc_badness(cost);
        }
        let cutoff = eval.cutoff();
        vta.retain(|candidate| candidate.badness() <= cutoff);
    }

    /// A weighted-random atom site offset by a lattice vector with
    /// components in {0, 1}; covers the equivalent sites around the cell.
    pub(crate) fn any_offset_site<R: Rng>(
        &self,
        weights: &[f64],
        rng: &mut R,
    ) -> std::result::Result<Point3<f64>, SamplingError> {
        let index = sampling::weighted_int(weights, rng)?;
        let mno = Vector3::new(
            rng.gen_range(0..2) as f64,
            rng.gen_range(0..2) as f64,
            rng.gen_range(0..2) as f64,
        );
        Ok(self.atoms[index].position + self.lattice.cartesian(&mno))
    }

    /// Shift all atoms so the first one sits at the lattice origin.
    pub(crate) fn shift_to_origin(&mut self) {
        let Some(first) = self.atoms.first() else {
            return;
        };
        let r0 = first.position.coords;
        if r0.norm() > EPS_DISTANCE {
            self.shift(&(-r0));
        }
    }

    /// Translate every atom, wrapping the results back into the cell.
    /// Image pair distances are translation invariant, so no cost entry
    /// changes.
    pub fn shift(&mut self, dv: &Vector3<f64>) {
        for atom in self.atoms.iter_mut() {
            atom.position =
                Point3::from(self.lattice.ucv_cartesian_adjusted(&(atom.position.coords + dv)));
        }
    }

    fn evaluator(&self) -> AtomCostCrystal<'_> {
        AtomCostCrystal::new(
            &self.atoms,
            &self.dtarget,
            &self.lattice,
            self.params.penalty,
            self.params.tol_dd,
            self.effective_rmax(),
        )
    }

    fn crop_distance_table(&mut self) -> Result<()> {
        let rmax = self.effective_rmax();
        let cropped: Vec<f64> = self.full_table.iter().filter(|&d| d <= rmax).collect();
        self.dtarget = DistanceTable::new(cropped)?;
        Ok(())
    }

    fn alloc_slot(&mut self) -> usize {
        if let Some(&slot) = self.free_slots.iter().next() {
            self.free_slots.remove(&slot);
            return slot;
        }
        let slot = self.atoms.len();
        self.resize_pair_matrices(slot + 1);
        slot
    }

    fn resize_pair_matrices(&mut self, needed: usize) {
        let current = self.pmx_partial_costs.nrows();
        if needed <= current {
            return;
        }
        let new_size = grown_matrix_size(current, needed, self.max_atom_count);
        let costs = std::mem::replace(&mut self.pmx_partial_costs, DMatrix::zeros(0, 0));
        self.pmx_partial_costs = costs.resize(new_size, new_size, 0.0);
        let counts = std::mem::replace(&mut self.pmx_pair_counts, DMatrix::zeros(0, 0));
        self.pmx_pair_counts = counts.resize(new_size, new_size, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQRT3_HALF: f64 = 0.866_025_403_784_438_6;

    fn bcc_crystal() -> Crystal {
        let target = DistanceTable::new(vec![SQRT3_HALF, 1.0]).unwrap();
        let mut crystal = Crystal::new(
            &target,
            Lattice::default(),
            1.1,
            2,
            FitParams::default(),
        )
        .unwrap();
        crystal.add_position(Point3::new(0.0, 0.0, 0.0)).unwrap();
        crystal.add_position(Point3::new(0.5, 0.5, 0.5)).unwrap();
        crystal
    }

    fn assert_crystal_invariants(crystal: &Crystal) {
        // badness and pair count match the matrices, diagonals included
        let mut total = 0.0;
        let mut pairs = 0;
        for i in 0..crystal.atom_count() {
            let si = crystal.atoms[i].slot;
            total += crystal.pmx_partial_costs[(si, si)];
            pairs += crystal.pmx_pair_counts[(si, si)];
            for j in (i + 1)..crystal.atom_count() {
                let sj = crystal.atoms[j].slot;
                total += crystal.pmx_partial_costs[(si, sj)];
                pairs += crystal.pmx_pair_counts[(si, sj)];
            }
        }
        assert!(
            (total - crystal.badness()).abs() < EPS_COST,
            "matrix sum {total} vs badness {}",
            crystal.badness()
        );
        assert_eq!(pairs, crystal.count_pairs());
    }

    #[test]
    fn perfect_bcc_has_zero_badness() {
        let crystal = bcc_crystal();
        assert_eq!(crystal.badness(), 0.0);
        // per corner atom: 3 self pairs at 1.0 and 8 images at sqrt(3)/2
        assert_eq!(crystal.count_pairs(), 3 + 3 + 8);
        assert_crystal_invariants(&crystal);
    }

    #[test]
    fn positions_are_canonicalised_into_the_cell() {
        let target = DistanceTable::new(vec![1.0]).unwrap();
        let mut crystal =
            Crystal::new(&target, Lattice::default(), 1.1, 4, FitParams::default()).unwrap();
        crystal.add_position(Point3::new(1.25, -0.25, 3.0)).unwrap();
        let p = crystal.atoms()[0].position;
        assert!((p - Point3::new(0.25, 0.75, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn add_pop_restores_state_bitwise() {
        let mut crystal = bcc_crystal();
        let badness_before = crystal.badness();
        let pairs_before = crystal.count_pairs();
        let costs_before = crystal.pmx_partial_costs.clone();
        let counts_before = crystal.pmx_pair_counts.clone();
        let atom = crystal.atoms()[1].clone();
        crystal.pop_atom(1).unwrap();
        crystal.add_atom(atom).unwrap();
        assert_eq!(crystal.badness(), badness_before);
        assert_eq!(crystal.count_pairs(), pairs_before);
        assert_eq!(crystal.pmx_partial_costs, costs_before);
        assert_eq!(crystal.pmx_pair_counts, counts_before);
        assert_crystal_invariants(&crystal);
    }

    #[test]
    fn recalculate_is_idempotent() {
        let mut crystal = bcc_crystal();
        crystal.recalculate().unwrap();
        let first = crystal.badness();
        let pairs = crystal.count_pairs();
        crystal.recalculate().unwrap();
        assert_eq!(crystal.badness(), first);
        assert_eq!(crystal.count_pairs(), pairs);
        assert_crystal_invariants(&crystal);
    }

    #[test]
    fn displaced_atom_raises_badness() {
        let mut crystal = bcc_crystal();
        crystal.pop_atom(1).unwrap();
        crystal
            .add_position(Point3::new(0.55, 0.45, 0.5))
            .unwrap();
        assert!(crystal.badness() > 0.0);
        assert_crystal_invariants(&crystal);
    }

    #[test]
    fn rmax_crops_the_working_table() {
        let target =
            DistanceTable::new(vec![0.5, 1.0, 1.5, 2.5]).unwrap();
        let crystal =
            Crystal::new(&target, Lattice::default(), 1.2, 4, FitParams::default()).unwrap();
        assert_eq!(crystal.distance_table().as_slice(), &[0.5, 1.0]);
        assert_eq!(crystal.full_table.len(), 4);
    }

    #[test]
    fn shared_full_table_survives_cloning() {
        let crystal = bcc_crystal();
        let copy = crystal.clone();
        assert!(Arc::ptr_eq(&crystal.full_table, &copy.full_table));
        assert_eq!(copy.badness(), crystal.badness());
    }
}
