use super::grown_matrix_size;
use crate::core::constants::EPS_COST;
use crate::core::models::atom::Atom;
use crate::core::models::distance_table::DistanceTable;
use crate::engine::config::FitParams;
use crate::engine::cost::AtomCost;
use crate::engine::error::{LigaError, Result};
use crate::engine::relax::relax_position;
use itertools::Itertools;
use nalgebra::{DMatrix, Point3, Vector3};
use std::collections::BTreeSet;

/// A finite cluster fitted against a consumable distance table.
///
/// The working table shrinks as realised pairs claim target distances and
/// grows back when atoms are removed; `pmx_used_distances` records which
/// distance each pair holds (0 = none), so the multiset union of the
/// working table and the recorded distances always equals the original
/// target table.  Pair costs live in the symmetric `pmx_partial_costs`
/// matrix, indexed by the stable per-atom slots; total badness and the
/// per-atom halves are maintained incrementally by add and pop.
#[derive(Debug, Clone)]
pub struct Molecule {
    atoms: Vec<Atom>,
    dtarget: DistanceTable,
    pmx_partial_costs: DMatrix<f64>,
    pmx_used_distances: DMatrix<f64>,
    free_slots: BTreeSet<usize>,
    badness: f64,
    max_atom_count: usize,
    params: FitParams,
}

impl Molecule {
    pub fn new(dtarget: DistanceTable, params: FitParams) -> Result<Self> {
        let max_atom_count = dtarget.est_num_atoms()?;
        Ok(Self {
            atoms: Vec::new(),
            dtarget,
            pmx_partial_costs: DMatrix::zeros(0, 0),
            pmx_used_distances: DMatrix::zeros(0, 0),
            free_slots: BTreeSet::new(),
            badness: 0.0,
            max_atom_count,
            params,
        })
    }

    pub fn with_positions(
        dtarget: DistanceTable,
        params: FitParams,
        positions: &[Point3<f64>],
    ) -> Result<Self> {
        let mut molecule = Self::new(dtarget, params)?;
        for &position in positions {
            molecule.add_position(position)?;
        }
        Ok(molecule)
    }

    pub fn with_coordinates(
        dtarget: DistanceTable,
        params: FitParams,
        x: &[f64],
        y: &[f64],
        z: &[f64],
    ) -> Result<Self> {
        if x.len() != y.len() || x.len() != z.len() {
            return Err(LigaError::InvalidStructure(
                "coordinate vectors differ in length".into(),
            ));
        }
        let positions: Vec<Point3<f64>> = x
            .iter()
            .zip(y)
            .zip(z)
            .map(|((&x, &y), &z)| Point3::new(x, y, z))
            .collect();
        Self::with_positions(dtarget, params, &positions)
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

    pub fn set_max_atom_count(&mut self, count: usize) -> Result<()> {
        if count > self.dtarget.est_num_atoms()? {
            return Err(LigaError::InvalidStructure(format!(
                "not enough distances for max atom count {count}"
            )));
        }
        if count < 1 || count < self.atoms.len() {
            return Err(LigaError::InvalidStructure(format!(
                "invalid max atom count {count}"
            )));
        }
        self.max_atom_count = count;
        Ok(())
    }

    pub fn full(&self) -> bool {
        self.atoms.len() >= self.max_atom_count
    }

    pub fn badness(&self) -> f64 {
        self.badness
    }

    pub fn count_pairs(&self) -> usize {
        let n = self.atoms.len();
        n * (n - 1) / 2
    }

    pub fn params(&self) -> &FitParams {
        &self.params
    }

    pub fn distance_table(&self) -> &DistanceTable {
        &self.dtarget
    }

    pub fn max_table_distance(&self) -> f64 {
        self.dtarget.max_distance()
    }

    pub fn add_position(&mut self, position: Point3<f64>) -> Result<()> {
        self.add_atom(Atom::new(position))
    }

    pub fn add_atom(&mut self, atom: Atom) -> Result<()> {
        if self.atoms.len() >= self.max_atom_count {
            return Err(LigaError::InvalidStructure(
                "molecule is already at its maximum atom count".into(),
            ));
        }
        let mut atom = atom;
        atom.reset_badness();
        atom.slot = self.alloc_slot();
        let slot = atom.slot;

        let mut eval = AtomCost::new(
            &self.atoms,
            &self.dtarget,
            self.params.penalty,
            self.params.tol_dd,
        );
        eval.eval(&atom.position);
        let partials = eval.partial_costs().to_vec();
        let consumed: Vec<(usize, usize)> = eval
            .used_distance_indices()
            .iter()
            .copied()
            .zip(eval.used_atom_indices().iter().copied())
            .collect();
        let total = eval.total_cost();
        drop(eval);
        debug_assert_eq!(partials.len(), self.atoms.len());

        {
            let atoms = &mut self.atoms;
            let pmx = &mut self.pmx_partial_costs;
            for (other, &pair) in atoms.iter_mut().zip(&partials) {
                pmx[(slot, other.slot)] = pair;
                pmx[(other.slot, slot)] = pair;
                other.inc_badness(pair / 2.0);
                atom.inc_badness(pair / 2.0);
            }
        }
        self.badness += total;

        let mut taken: Vec<usize> = Vec::with_capacity(consumed.len());
        for &(table_index, atom_index) in &consumed {
            let other_slot = self.atoms[atom_index].slot;
            let distance = self.dtarget.get(table_index);
            self.pmx_used_distances[(slot, other_slot)] = distance;
            self.pmx_used_distances[(other_slot, slot)] = distance;
            taken.push(table_index);
        }
        // erase in descending index order so positions stay valid
        taken.sort_unstable_by(|a, b| b.cmp(a));
        for table_index in taken {
            self.dtarget.take_at(table_index);
        }

        if self.badness < EPS_COST {
            self.badness = 0.0;
        }
        self.atoms.push(atom);
        if self.full() {
            self.reassign_pairs();
        }
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
        let mut removed = 0.0;
        {
            let atoms = &mut self.atoms;
            let pmx = &mut self.pmx_partial_costs;
            let used = &mut self.pmx_used_distances;
            let dtarget = &mut self.dtarget;
            for other in atoms.iter_mut() {
                let pair = pmx[(slot, other.slot)];
                other.dec_badness(pair / 2.0);
                removed += pair;
                pmx[(slot, other.slot)] = 0.0;
                pmx[(other.slot, slot)] = 0.0;
                let held = used[(slot, other.slot)];
                if held > 0.0 {
                    dtarget.return_back(held);
                    used[(slot, other.slot)] = 0.0;
                    used[(other.slot, slot)] = 0.0;
                }
            }
        }
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

    pub fn n_fixed(&self) -> usize {
        self.atoms.iter().filter(|a| a.fixed).count()
    }

    /// Return all held distances and drop every atom.
    pub fn clear(&mut self) {
        self.return_used_distances();
        self.atoms.clear();
        self.free_slots.clear();
        self.pmx_partial_costs.fill(0.0);
        self.pmx_used_distances.fill(0.0);
        self.badness = 0.0;
    }

    /// Full rebuild from atom positions: distances go back to the table
    /// first, then every atom is re-inserted through the incremental path.
    pub fn recalculate(&mut self) -> Result<()> {
        let saved = self.atoms.clone();
        self.clear();
        for atom in saved {
            self.add_atom(atom)?;
        }
        Ok(())
    }

    /// Rank-match the held distances with the realised pair distances.
    ///
    /// Both sequences are sorted and re-paired by rank, which can only
    /// lower the sum of penalties; the pair costs and badness sums are
    /// rebuilt from the new assignment.
    pub fn reassign_pairs(&mut self) {
        let mut slots = Vec::new();
        let mut realised = Vec::new();
        let mut held = Vec::new();
        for (i, j) in (0..self.atoms.len()).tuple_combinations() {
            let (s0, s1) = (self.atoms[i].slot, self.atoms[j].slot);
            let distance = self.pmx_used_distances[(s0, s1)];
            if distance <= 0.0 {
                continue;
            }
            slots.push((s0, s1));
            realised.push(nalgebra::distance(
                &self.atoms[i].position,
                &self.atoms[j].position,
            ));
            held.push(distance);
        }
        if slots.len() < 2 {
            return;
        }
        let org_badness = self.badness;
        let mut order: Vec<usize> = (0..slots.len()).collect();
        order.sort_by(|&a, &b| {
            realised[a]
                .partial_cmp(&realised[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        held.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        for (rank, &element) in order.iter().enumerate() {
            let (s0, s1) = slots[element];
            let distance = held[rank];
            self.pmx_used_distances[(s0, s1)] = distance;
            self.pmx_used_distances[(s1, s0)] = distance;
            let cost = self
                .params
                .penalty
                .eval(distance - realised[element], self.params.tol_dd);
            self.pmx_partial_costs[(s0, s1)] = cost;
            self.pmx_partial_costs[(s1, s0)] = cost;
        }
        self.rebuild_badness();
        debug_assert!(
            self.badness < (1.0 + 1.0e-6) * org_badness + 1.0e-6,
            "pair reassignment increased badness from {org_badness} to {}",
            self.badness
        );
    }

    /// Refine an external atom's position against the current atoms.
    pub fn relax_external(&self, atom: &mut Atom) {
        if self.atoms.len() < 3 {
            return;
        }
        let mut eval = AtomCost::new(
            &self.atoms,
            &self.dtarget,
            self.params.penalty,
            self.params.tol_dd,
        );
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

    /// Cost-screen evolve candidates in place, accumulating each
    /// candidate's badness and dropping those above the tightened cutoff.
    pub(crate) fn screen_candidates(&self, vta: &mut Vec<Atom>, evolve_range: f64, hi_abad: f64) {
        let mut eval = AtomCost::new(
            &self.atoms,
            &self.dtarget,
            self.params.penalty,
            self.params.tol_dd,
        );
        eval.set_cutoff(hi_abad);
        eval.set_cutoff_range(evolve_range);
        for candidate in vta.iter_mut() {
            let cost = eval.eval(&candidate.position);
            candidate.inc_badness(cost);
        }
        let cutoff = eval.cutoff();
        vta.retain(|candidate| candidate.badness() <= cutoff);
    }

    pub fn shift(&mut self, dv: &Vector3<f64>) {
        for atom in &mut self.atoms {
            atom.position += dv;
        }
    }

    /// Move the centre of mass to the origin.
    pub fn center(&mut self) {
        if self.atoms.is_empty() {
            return;
        }
        let mut sum = Vector3::zeros();
        for atom in &self.atoms {
            sum += atom.position.coords;
        }
        let shift = -sum / self.atoms.len() as f64;
        self.shift(&shift);
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
        let used = std::mem::replace(&mut self.pmx_used_distances, DMatrix::zeros(0, 0));
        self.pmx_used_distances = used.resize(new_size, new_size, 0.0);
    }

    fn return_used_distances(&mut self) {
        for (i, j) in (0..self.atoms.len()).tuple_combinations() {
            let (s0, s1) = (self.atoms[i].slot, self.atoms[j].slot);
            let held = self.pmx_used_distances[(s0, s1)];
            if held > 0.0 {
                self.dtarget.return_back(held);
                self.pmx_used_distances[(s0, s1)] = 0.0;
                self.pmx_used_distances[(s1, s0)] = 0.0;
            }
        }
    }

    fn rebuild_badness(&mut self) {
        for atom in &mut self.atoms {
            atom.reset_badness();
        }
        self.badness = 0.0;
        let mut halves = vec![0.0; self.atoms.len()];
        for (i, j) in (0..self.atoms.len()).tuple_combinations() {
            let pair = self.pmx_partial_costs[(self.atoms[i].slot, self.atoms[j].slot)];
            self.badness += pair;
            halves[i] += pair / 2.0;
            halves[j] += pair / 2.0;
        }
        for (atom, half) in self.atoms.iter_mut().zip(halves) {
            atom.inc_badness(half);
        }
        if self.badness < EPS_COST {
            self.badness = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::EPS_COST;

    fn table(values: &[f64]) -> DistanceTable {
        DistanceTable::new(values.to_vec()).unwrap()
    }

    fn triangle_molecule() -> Molecule {
        let mut molecule = Molecule::new(table(&[1.0, 1.0, 1.0]), FitParams::default()).unwrap();
        molecule.add_position(Point3::new(0.0, 0.0, 0.0)).unwrap();
        molecule.add_position(Point3::new(1.0, 0.0, 0.0)).unwrap();
        molecule
            .add_position(Point3::new(0.5, 0.75f64.sqrt(), 0.0))
            .unwrap();
        molecule
    }

    // five distinct atoms on a line; target distances from the geometry
    fn line_molecule() -> Molecule {
        let xs: [f64; 5] = [0.0, 1.0, 2.3, 3.1, 4.9];
        let mut distances = Vec::new();
        for i in 0..xs.len() {
            for j in (i + 1)..xs.len() {
                distances.push((xs[j] - xs[i]).abs());
            }
        }
        let mut molecule = Molecule::new(table(&distances), FitParams::default()).unwrap();
        // leave room so add/pop tests are not at capacity
        for &x in &xs[..4] {
            molecule.add_position(Point3::new(x, 0.0, 0.0)).unwrap();
        }
        molecule
    }

    fn assert_pair_cost_invariants(molecule: &Molecule) {
        // badness equals the sum of pair costs
        let mut total = 0.0;
        for i in 0..molecule.atom_count() {
            for j in (i + 1)..molecule.atom_count() {
                let pair = molecule.pmx_partial_costs
                    [(molecule.atoms[i].slot, molecule.atoms[j].slot)];
                assert!(pair >= 0.0);
                total += pair;
            }
        }
        assert!(
            (total - molecule.badness()).abs() < EPS_COST,
            "pair sum {total} vs badness {}",
            molecule.badness()
        );
        // each atom holds half of its row
        for i in 0..molecule.atom_count() {
            let mut row_half = 0.0;
            for j in 0..molecule.atom_count() {
                if i == j {
                    continue;
                }
                row_half += molecule.pmx_partial_costs
                    [(molecule.atoms[i].slot, molecule.atoms[j].slot)]
                    / 2.0;
            }
            assert!(
                (row_half - molecule.atoms[i].badness()).abs() < EPS_COST,
                "atom {i} badness {} vs half row {row_half}",
                molecule.atoms[i].badness()
            );
        }
    }

    fn assert_distance_conservation(molecule: &Molecule, original: &DistanceTable) {
        let mut all: Vec<f64> = molecule.distance_table().iter().collect();
        for i in 0..molecule.atom_count() {
            for j in (i + 1)..molecule.atom_count() {
                let held = molecule.pmx_used_distances
                    [(molecule.atoms[i].slot, molecule.atoms[j].slot)];
                if held > 0.0 {
                    all.push(held);
                }
            }
        }
        all.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(all.len(), original.len());
        for (a, b) in all.iter().zip(original.iter()) {
            assert!((a - b).abs() < 1e-12, "distance multiset changed");
        }
    }

    #[test]
    fn perfect_triangle_has_zero_badness() {
        let molecule = triangle_molecule();
        assert_eq!(molecule.badness(), 0.0);
        assert!(molecule.full());
        assert!(molecule.distance_table().is_empty());
        assert_pair_cost_invariants(&molecule);
    }

    #[test]
    fn distance_multiset_is_conserved_through_growth() {
        let original = table(&[1.0, 1.0, 1.0]);
        let mut molecule = Molecule::new(original.clone(), FitParams::default()).unwrap();
        molecule.add_position(Point3::new(0.0, 0.0, 0.0)).unwrap();
        assert_distance_conservation(&molecule, &original);
        molecule.add_position(Point3::new(1.0, 0.0, 0.0)).unwrap();
        assert_distance_conservation(&molecule, &original);
        molecule.add_position(Point3::new(0.4, 0.8, 0.0)).unwrap();
        assert_distance_conservation(&molecule, &original);
    }

    #[test]
    fn add_then_pop_restores_badness_and_table() {
        let mut molecule = line_molecule();
        let badness_before = molecule.badness();
        let table_before = molecule.distance_table().clone();
        molecule.add_position(Point3::new(4.9, 0.0, 0.0)).unwrap();
        molecule.pop_atom(4).unwrap();
        assert!((molecule.badness() - badness_before).abs() < EPS_COST);
        assert_eq!(molecule.distance_table(), &table_before);
        assert_pair_cost_invariants(&molecule);
    }

    #[test]
    fn pop_then_readd_restores_badness() {
        let mut molecule = line_molecule();
        let badness_before = molecule.badness();
        let popped = molecule.pop_atom(2).unwrap();
        assert_pair_cost_invariants(&molecule);
        molecule.add_atom(popped).unwrap();
        assert!((molecule.badness() - badness_before).abs() < EPS_COST);
        assert_pair_cost_invariants(&molecule);
    }

    #[test]
    fn recalculate_is_idempotent() {
        let mut molecule = line_molecule();
        molecule.recalculate().unwrap();
        let first = molecule.badness();
        molecule.recalculate().unwrap();
        assert!((molecule.badness() - first).abs() < EPS_COST);
        assert_pair_cost_invariants(&molecule);
    }

    #[test]
    fn reassign_pairs_never_increases_badness() {
        let mut molecule = line_molecule();
        molecule.add_position(Point3::new(4.95, 0.0, 0.0)).unwrap();
        let before = molecule.badness();
        molecule.reassign_pairs();
        assert!(molecule.badness() <= (1.0 + 1e-6) * before + 1e-6);
        assert_pair_cost_invariants(&molecule);
    }

    #[test]
    fn clear_returns_every_distance() {
        let original = table(&[1.0, 1.0, 1.0]);
        let mut molecule = triangle_molecule();
        molecule.clear();
        assert_eq!(molecule.atom_count(), 0);
        assert_eq!(molecule.badness(), 0.0);
        assert_eq!(molecule.distance_table(), &original);
    }

    #[test]
    fn adding_past_capacity_fails() {
        let mut molecule = triangle_molecule();
        let err = molecule.add_position(Point3::new(5.0, 5.0, 5.0));
        assert!(matches!(err, Err(LigaError::InvalidStructure(_))));
    }

    #[test]
    fn pop_out_of_range_fails() {
        let mut molecule = triangle_molecule();
        assert!(matches!(
            molecule.pop_atom(7),
            Err(LigaError::IndexOutOfRange { index: 7, len: 3 })
        ));
    }

    #[test]
    fn mismatched_coordinate_vectors_fail() {
        let result = Molecule::with_coordinates(
            table(&[1.0, 1.0, 1.0]),
            FitParams::default(),
            &[0.0, 1.0],
            &[0.0],
            &[0.0, 0.0],
        );
        assert!(matches!(result, Err(LigaError::InvalidStructure(_))));
    }

    #[test]
    fn slots_are_reused_after_pop() {
        let mut molecule = line_molecule();
        let popped = molecule.pop_atom(1).unwrap();
        let freed = popped.slot;
        molecule.add_position(Point3::new(9.0, 0.0, 0.0)).unwrap();
        assert_eq!(molecule.atoms().last().unwrap().slot, freed);
    }

    #[test]
    fn center_moves_centroid_to_origin() {
        let mut molecule = line_molecule();
        molecule.center();
        let mut sum = Vector3::zeros();
        for atom in molecule.atoms() {
            sum += atom.position.coords;
        }
        assert!(sum.norm() < 1e-12);
    }
}
