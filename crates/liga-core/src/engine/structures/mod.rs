//! The two structure variants and their shared search operations.
//!
//! `Molecule` and `Crystal` each own their atoms, pair matrices and
//! incremental cost bookkeeping; the composite operations that drive the
//! search (candidate pushes, evolve, degenerate, single-atom relaxation)
//! live on the closed `Structure` enum and dispatch to the variant
//! primitives where the two differ: anchor generation, distance reuse and
//! unit-cell canonicalisation.

pub mod crystal;
pub mod molecule;

pub use crystal::Crystal;
pub use molecule::Molecule;

use crate::core::constants::{EPS_DISTANCE, eps_gt};
use crate::core::io::{self, IoError, StructureFormat};
use crate::core::models::atom::{Atom, TriangulationKind};
use crate::core::models::distance_table::DistanceTable;
use crate::core::utils::geometry;
use crate::engine::config::FitParams;
use crate::engine::error::{LigaError, Result};
use crate::engine::utils::sampling;
use nalgebra::{Point3, Vector3};
use rand::Rng;
use std::path::Path;

/// User-defined screen over candidate atom positions, run before the cost
/// evaluation during evolve.
pub trait AtomFilter: Send + Sync {
    fn check(&self, candidate: &Atom, structure: &Structure) -> bool;
}

/// Accepted and attempted candidate counts per triangulation kind,
/// reported by one evolve call.
#[derive(Debug, Default, Clone, Copy)]
pub struct EvolveStats {
    pub accepted: [usize; TriangulationKind::COUNT],
    pub attempted: [usize; TriangulationKind::COUNT],
}

/// Base atoms a triangulation builds on.  `count` tells how many of the
/// positions are meaningful.
pub(crate) struct Anchor {
    pub count: usize,
    pub b0: Point3<f64>,
    pub b1: Point3<f64>,
    pub b2: Point3<f64>,
}

impl Anchor {
    fn single(b0: Point3<f64>) -> Self {
        Self {
            count: 1,
            b0,
            b1: Point3::origin(),
            b2: Point3::origin(),
        }
    }
}

/// Pair matrices grow geometrically up to the structure capacity.
pub(crate) fn grown_matrix_size(current: usize, needed: usize, cap: usize) -> usize {
    needed.max((2 * current).min(cap))
}

/// Distance-triple orderings for the pyramid search.
const PYRAMID_PERMUTATIONS: [[usize; 3]; 6] = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
];

const LOOKOUT_TRIALS: usize = 1500;

#[derive(Debug, Clone)]
pub enum Structure {
    Molecule(Molecule),
    Crystal(Crystal),
}

impl From<Molecule> for Structure {
    fn from(molecule: Molecule) -> Self {
        Structure::Molecule(molecule)
    }
}

impl From<Crystal> for Structure {
    fn from(crystal: Crystal) -> Self {
        Structure::Crystal(crystal)
    }
}

impl Structure {
    pub fn atoms(&self) -> &[Atom] {
        match self {
            Structure::Molecule(m) => m.atoms(),
            Structure::Crystal(c) => c.atoms(),
        }
    }

    pub fn atom(&self, index: usize) -> &Atom {
        &self.atoms()[index]
    }

    pub fn atom_count(&self) -> usize {
        self.atoms().len()
    }

    pub fn max_atom_count(&self) -> usize {
        match self {
            Structure::Molecule(m) => m.max_atom_count(),
            Structure::Crystal(c) => c.max_atom_count(),
        }
    }

    pub fn full(&self) -> bool {
        self.atom_count() >= self.max_atom_count()
    }

    pub fn badness(&self) -> f64 {
        match self {
            Structure::Molecule(m) => m.badness(),
            Structure::Crystal(c) => c.badness(),
        }
    }

    pub fn count_pairs(&self) -> usize {
        match self {
            Structure::Molecule(m) => m.count_pairs(),
            Structure::Crystal(c) => c.count_pairs(),
        }
    }

    /// Normalised badness: total badness per realised pair.
    pub fn cost(&self) -> f64 {
        let pairs = self.count_pairs();
        if pairs == 0 {
            0.0
        } else {
            self.badness() / pairs as f64
        }
    }

    pub fn add_atom(&mut self, atom: Atom) -> Result<()> {
        match self {
            Structure::Molecule(m) => m.add_atom(atom),
            Structure::Crystal(c) => c.add_atom(atom),
        }
    }

    pub fn add_position(&mut self, position: Point3<f64>) -> Result<()> {
        self.add_atom(Atom::new(position))
    }

    pub fn pop_atom(&mut self, index: usize) -> Result<Atom> {
        match self {
            Structure::Molecule(m) => m.pop_atom(index),
            Structure::Crystal(c) => c.pop_atom(index),
        }
    }

    /// Pop several atoms; indices are processed in descending order so the
    /// remaining ones stay valid.
    pub fn pop_many(&mut self, indices: &[usize]) -> Result<()> {
        let mut sorted = indices.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        for &index in sorted.iter().rev() {
            self.pop_atom(index)?;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        match self {
            Structure::Molecule(m) => m.clear(),
            Structure::Crystal(c) => c.clear(),
        }
    }

    pub fn recalculate(&mut self) -> Result<()> {
        match self {
            Structure::Molecule(m) => m.recalculate(),
            Structure::Crystal(c) => c.recalculate(),
        }
    }

    pub fn fix_atom(&mut self, index: usize) -> Result<()> {
        match self {
            Structure::Molecule(m) => m.fix_atom(index),
            Structure::Crystal(c) => c.fix_atom(index),
        }
    }

    /// Replace the whole atom content with the given positions.
    pub fn set_positions(&mut self, positions: &[Point3<f64>]) -> Result<()> {
        self.clear();
        for &position in positions {
            self.add_position(position)?;
        }
        Ok(())
    }

    pub fn params(&self) -> &FitParams {
        match self {
            Structure::Molecule(m) => m.params(),
            Structure::Crystal(c) => c.params(),
        }
    }

    fn working_table(&self) -> &DistanceTable {
        match self {
            Structure::Molecule(m) => m.distance_table(),
            Structure::Crystal(c) => c.distance_table(),
        }
    }

    /// Crystals score every pair against the full table; molecules consume
    /// distances, so anchor distance picks must stay distinct.
    fn dist_reuse(&self) -> bool {
        matches!(self, Structure::Crystal(_))
    }

    fn post_mutation(&mut self) {
        if let Structure::Crystal(c) = self {
            c.shift_to_origin();
        }
    }

    fn min_atoms_for(&self, kind: TriangulationKind) -> usize {
        match self {
            Structure::Molecule(_) => match kind {
                TriangulationKind::Linear => 1,
                TriangulationKind::Planar => 2,
                TriangulationKind::Spatial => 3,
            },
            // any site offset by a lattice vector can serve as an anchor
            Structure::Crystal(_) => 1,
        }
    }

    fn ensure_can_push(&self, kind: TriangulationKind) -> Result<()> {
        if self.full() {
            return Err(LigaError::InvalidStructure(
                "structure too large for finding a new position".into(),
            ));
        }
        let needed = self.min_atoms_for(kind);
        if self.atom_count() < needed {
            return Err(LigaError::InvalidStructure(format!(
                "{} atoms are too few for {:?} triangulation",
                self.atom_count(),
                kind
            )));
        }
        Ok(())
    }

    fn line_anchor<R: Rng>(&self, weights: &[f64], rng: &mut R) -> Result<Anchor> {
        match self {
            Structure::Molecule(m) => {
                let count = m.atom_count().min(2);
                let picks = sampling::weighted_choose(count, weights, rng)?;
                let mut anchor = Anchor::single(m.atoms()[picks[0]].position);
                if count > 1 {
                    anchor.b1 = m.atoms()[picks[1]].position;
                    anchor.count = 2;
                }
                Ok(anchor)
            }
            Structure::Crystal(c) => {
                let mut anchor = Anchor::single(c.any_offset_site(weights, rng)?);
                anchor.b1 = c.any_offset_site(weights, rng)?;
                anchor.count = 2;
                Ok(anchor)
            }
        }
    }

    fn plane_anchor<R: Rng>(&self, weights: &[f64], rng: &mut R) -> Result<Anchor> {
        match self {
            Structure::Molecule(m) => {
                let count = m.atom_count().min(3);
                let picks = sampling::weighted_choose(count, weights, rng)?;
                let mut anchor = Anchor::single(m.atoms()[picks[0]].position);
                anchor.b1 = m.atoms()[picks[1]].position;
                anchor.count = count;
                if count > 2 {
                    anchor.b2 = m.atoms()[picks[2]].position;
                }
                Ok(anchor)
            }
            Structure::Crystal(c) => {
                let mut anchor = Anchor::single(c.any_offset_site(weights, rng)?);
                anchor.b1 = c.any_offset_site(weights, rng)?;
                anchor.b2 = c.any_offset_site(weights, rng)?;
                anchor.count = 3;
                Ok(anchor)
            }
        }
    }

    fn pyramid_anchor<R: Rng>(&self, weights: &[f64], rng: &mut R) -> Result<Anchor> {
        match self {
            Structure::Molecule(m) => {
                let picks = sampling::weighted_choose(3, weights, rng)?;
                Ok(Anchor {
                    count: 3,
                    b0: m.atoms()[picks[0]].position,
                    b1: m.atoms()[picks[1]].position,
                    b2: m.atoms()[picks[2]].position,
                })
            }
            Structure::Crystal(_) => self.plane_anchor(weights, rng),
        }
    }

    /// New-atom candidates on a line through an anchor, at a table radius.
    fn push_good_distances<R: Rng>(
        &self,
        vta: &mut Vec<Atom>,
        weights: &[f64],
        ntrials: usize,
        rng: &mut R,
    ) -> Result<usize> {
        if ntrials == 0 {
            return Ok(0);
        }
        self.ensure_can_push(TriangulationKind::Linear)?;
        let table = self.working_table();
        let mut push_count = 0;
        let mut nt = 0;
        while nt < ntrials {
            nt += 1;
            let anchor = self.line_anchor(weights, rng)?;
            let mut direction = if anchor.count > 1 {
                anchor.b1 - anchor.b0
            } else {
                Vector3::zeros()
            };
            let nm = direction.norm();
            let along_pair = nm > EPS_DISTANCE;
            if along_pair {
                direction /= nm;
            } else {
                direction = Vector3::z();
            }
            let radius = table.get(rng.gen_range(0..table.len()));
            vta.push(Atom::with_kind(
                anchor.b0 + direction * radius,
                TriangulationKind::Linear,
            ));
            push_count += 1;
            // the opposite direction makes sense only along a real pair,
            // and accounts for an extra trial
            if along_pair {
                nt += 1;
                vta.push(Atom::with_kind(
                    anchor.b0 - direction * radius,
                    TriangulationKind::Linear,
                ));
                push_count += 1;
            }
        }
        Ok(push_count)
    }

    /// Triangle vertices over a two-atom base, up to four per anchor when
    /// a third atom orients the plane.
    fn push_good_triangles<R: Rng>(
        &self,
        vta: &mut Vec<Atom>,
        weights: &[f64],
        ntrials: usize,
        rng: &mut R,
    ) -> Result<usize> {
        if ntrials == 0 {
            return Ok(0);
        }
        self.ensure_can_push(TriangulationKind::Planar)?;
        let reuse = self.dist_reuse();
        let mut push_count = 0;
        let mut nt = 0;
        while nt < ntrials {
            nt += 1;
            let anchor = self.plane_anchor(weights, rng)?;
            let table = self.working_table();
            let didx = if reuse {
                sampling::pick_with_repeat(2, table.len(), rng)
            } else {
                sampling::pick_few(2, table.len(), rng)?
            };
            let r02 = table.get(didx[0]);
            let r12 = table.get(didx[1]);
            let r01 = nalgebra::distance(&anchor.b0, &anchor.b1);
            let Some((xl0, xp)) = geometry::triangle_vertex(r01, r02, r12) else {
                continue;
            };
            let xlong = [xl0, r01 - xl0];
            let xperp = [-xp, xp];
            let longdir = (anchor.b1 - anchor.b0) / r01;
            let mut perpdir = if anchor.count > 2 {
                let v = anchor.b2 - anchor.b0;
                v - longdir * longdir.dot(&v)
            } else {
                Vector3::zeros()
            };
            let nm = perpdir.norm();
            let oriented_plane = nm > EPS_DISTANCE;
            if oriented_plane {
                perpdir /= nm;
            } else {
                perpdir = geometry::perpendicular_axis(&longdir);
            }
            // vertex search succeeded; count trials per emitted vertex
            nt -= 1;
            'vertices: for &xl in &xlong {
                for &xpv in &xperp {
                    nt += 1;
                    vta.push(Atom::with_kind(
                        anchor.b0 + xl * longdir + xpv * perpdir,
                        TriangulationKind::Planar,
                    ));
                    push_count += 1;
                    if !oriented_plane {
                        break 'vertices;
                    }
                }
            }
        }
        Ok(push_count)
    }

    /// Pyramid apices over a three-atom base, all six orderings of the
    /// picked distance triple.
    fn push_good_pyramids<R: Rng>(
        &self,
        vta: &mut Vec<Atom>,
        weights: &[f64],
        ntrials: usize,
        rng: &mut R,
    ) -> Result<usize> {
        if ntrials == 0 {
            return Ok(0);
        }
        self.ensure_can_push(TriangulationKind::Spatial)?;
        let reuse = self.dist_reuse();
        let mut push_count = 0;
        let mut nt = 0;
        while nt < ntrials {
            let anchor = self.pyramid_anchor(weights, rng)?;
            let table = self.working_table();
            let didx = if reuse {
                sampling::pick_with_repeat(3, table.len(), rng)
            } else {
                sampling::pick_few(3, table.len(), rng)?
            };
            let mut dv = [table.get(didx[0]), table.get(didx[1]), table.get(didx[2])];
            dv.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            for perm in &PYRAMID_PERMUTATIONS {
                nt += 1;
                let apices = geometry::pyramid_apices(
                    &anchor.b0,
                    &anchor.b1,
                    &anchor.b2,
                    dv[perm[0]],
                    dv[perm[1]],
                    dv[perm[2]],
                );
                for (i, apex) in apices.iter().enumerate() {
                    // a mirrored second apex accounts for an extra trial
                    if i > 0 {
                        nt += 1;
                    }
                    vta.push(Atom::with_kind(*apex, TriangulationKind::Spatial));
                    push_count += 1;
                }
            }
        }
        Ok(push_count)
    }

    /// Lookout scan for the second atom: all unique radii in both
    /// z-directions when the budget allows, random radii otherwise.
    fn push_second_atoms<R: Rng>(
        &self,
        vta: &mut Vec<Atom>,
        ntrials: usize,
        rng: &mut R,
    ) -> Result<usize> {
        if self.atom_count() != 1 {
            return Err(LigaError::InvalidStructure(
                "second-atom scan requires a single-atom structure".into(),
            ));
        }
        let a0 = self.atom(0).position;
        let table = self.working_table();
        let mut push_count = 0;
        if ntrials > 2 * table.count_unique() {
            for d in table.unique() {
                for dz in [d, -d] {
                    vta.push(Atom::with_kind(
                        Point3::new(a0.x, a0.y, a0.z + dz),
                        TriangulationKind::Linear,
                    ));
                    push_count += 1;
                }
            }
        } else {
            for _ in 0..ntrials {
                let dz = table.get(rng.gen_range(0..table.len())) * sampling::plus_minus(rng);
                vta.push(Atom::with_kind(
                    Point3::new(a0.x, a0.y, a0.z + dz),
                    TriangulationKind::Linear,
                ));
                push_count += 1;
            }
        }
        Ok(push_count)
    }

    /// Lookout scan for the third atom: triangle vertices over the only
    /// pair, exhaustive over unique radii when the budget allows.
    fn push_third_atoms<R: Rng>(
        &self,
        vta: &mut Vec<Atom>,
        ntrials: usize,
        rng: &mut R,
    ) -> Result<usize> {
        if self.atom_count() != 2 {
            return Err(LigaError::InvalidStructure(
                "third-atom scan requires a two-atom structure".into(),
            ));
        }
        let table = self.working_table();
        let nunique = table.count_unique();
        let mut radii: Vec<(f64, f64)> = Vec::new();
        if ntrials > 2 * nunique * nunique {
            let unique = table.unique();
            for &r02 in &unique {
                for &r12 in &unique {
                    radii.push((r02, r12));
                }
            }
        } else {
            for _ in 0..ntrials {
                let didx = if self.dist_reuse() {
                    sampling::pick_with_repeat(2, table.len(), rng)
                } else {
                    sampling::pick_few(2, table.len(), rng)?
                };
                radii.push((table.get(didx[0]), table.get(didx[1])));
            }
        }
        let a0 = self.atom(0).position;
        let a1 = self.atom(1).position;
        let r01 = nalgebra::distance(&a0, &a1);
        let longdir = (a1 - a0) / r01;
        let mut perpdir = Vector3::x().cross(&longdir);
        let nm = perpdir.norm();
        if nm == 0.0 {
            perpdir = Vector3::y();
        } else {
            perpdir /= nm;
        }
        let mut push_count = 0;
        for (r02, r12) in radii {
            let Some((xlong, mut xperp)) = geometry::triangle_vertex(r01, r02, r12) else {
                continue;
            };
            if xperp > 0.0 && rng.gen_range(0..2) == 0 {
                xperp = -xperp;
            }
            vta.push(Atom::with_kind(
                a0 + xlong * longdir + xperp * perpdir,
                TriangulationKind::Planar,
            ));
            push_count += 1;
        }
        Ok(push_count)
    }

    /// Number of near-perfect pairs each candidate would form with the
    /// other candidates; the lookout selection score.
    fn good_neighbors_count(&self, vta: &[Atom]) -> Vec<usize> {
        let params = self.params();
        let table = self.working_table();
        let hi_pbad = params.tol_nbad / 10.0;
        let mut counts = vec![0usize; vta.len()];
        for i in 0..vta.len() {
            for j in (i + 1)..vta.len() {
                let d = nalgebra::distance(&vta[i].position, &vta[j].position);
                let dd = table.get(table.find_nearest(d)) - d;
                if params.penalty.eval(dd, params.tol_dd) < hi_pbad {
                    counts[i] += 1;
                    counts[j] += 1;
                }
            }
        }
        counts
    }

    fn filter_candidates(&self, vta: &mut Vec<Atom>, evolve_range: f64, hi_abad: f64) {
        if !self.params().filters.is_empty() {
            let filters: Vec<_> = self.params().filters.clone();
            vta.retain(|candidate| filters.iter().all(|f| f.check(candidate, self)));
        }
        match self {
            Structure::Molecule(m) => m.screen_candidates(vta, evolve_range, hi_abad),
            Structure::Crystal(c) => c.screen_candidates(vta, evolve_range, hi_abad),
        }
    }

    /// One step of growth: generate candidates within the triangulation
    /// budgets, filter by cost, insert by fitness-weighted choice and
    /// optionally keep going while candidates survive.
    pub fn evolve<R: Rng>(&mut self, est_triang: &[usize; 3], rng: &mut R) -> Result<EvolveStats> {
        if self.full() {
            return Err(LigaError::InvalidStructure(
                "full-sized structure cannot evolve".into(),
            ));
        }
        let params = self.params().clone();
        let natoms = self.atom_count();
        let mut stats = EvolveStats::default();
        let lookout = params.lookout_prob > 0.0
            && (1..=2).contains(&natoms)
            && rng.gen::<f64>() < params.lookout_prob;
        let mut vta: Vec<Atom> = Vec::new();
        match natoms {
            0 => {
                self.add_atom(Atom::at(0.0, 0.0, 0.0))?;
                stats.accepted[TriangulationKind::Linear.index()] = 1;
                stats.attempted[TriangulationKind::Linear.index()] = 1;
                self.post_mutation();
                return Ok(stats);
            }
            1 if lookout => {
                self.push_second_atoms(&mut vta, LOOKOUT_TRIALS, rng)?;
            }
            2 if lookout => {
                self.push_third_atoms(&mut vta, LOOKOUT_TRIALS, rng)?;
            }
            _ => {
                let costs: Vec<f64> = self.atoms().iter().map(Atom::badness).collect();
                let weights = sampling::cost_to_fitness(&costs);
                self.push_good_distances(&mut vta, &weights, est_triang[0], rng)?;
                self.push_good_triangles(&mut vta, &weights, est_triang[1], rng)?;
                self.push_good_pyramids(&mut vta, &weights, est_triang[2], rng)?;
            }
        }
        for candidate in &vta {
            stats.attempted[candidate.kind.index()] += 1;
        }
        let evolve_range = natoms as f64 * params.tol_nbad * params.promotefrac;
        let mut hi_abad = f64::INFINITY;
        loop {
            self.filter_candidates(&mut vta, evolve_range, hi_abad);
            if vta.is_empty() {
                break;
            }
            let fitness: Vec<f64> = if lookout {
                let counts = self.good_neighbors_count(&vta);
                let max_count = counts.iter().copied().max().unwrap_or(0);
                counts
                    .iter()
                    .map(|&c| if c < max_count / 2 { 0.0 } else { c as f64 })
                    .collect()
            } else {
                let costs: Vec<f64> = vta.iter().map(Atom::badness).collect();
                sampling::cost_to_fitness(&costs)
            };
            let index = sampling::weighted_int(&fitness, rng)?;
            let chosen = vta.remove(index);
            let kind = chosen.kind;
            hi_abad = chosen.badness() + evolve_range;
            self.add_atom(chosen)?;
            stats.accepted[kind.index()] += 1;
            if params.promoterelax {
                self.relax_worst_free_atom()?;
            }
            if self.full() || !params.promotejump {
                break;
            }
            for candidate in &mut vta {
                candidate.reset_badness();
            }
        }
        self.post_mutation();
        Ok(stats)
    }

    /// Remove `npop` relaxable atoms sampled by badness weight.
    pub fn degenerate<R: Rng>(&mut self, npop: usize, rng: &mut R) -> Result<()> {
        let npop = npop.min(self.atom_count());
        if npop == 0 {
            return Ok(());
        }
        let mut free_indices = Vec::new();
        let mut free_badness = Vec::new();
        for (i, atom) in self.atoms().iter().enumerate() {
            if atom.fixed {
                continue;
            }
            free_indices.push(i);
            free_badness.push(atom.badness());
        }
        if free_indices.is_empty() {
            return Ok(());
        }
        let npop = npop.min(free_indices.len());
        let picks = sampling::weighted_choose(npop, &free_badness, rng)?;
        let indices: Vec<usize> = picks.into_iter().map(|i| free_indices[i]).collect();
        self.pop_many(&indices)?;
        if self.params().demoterelax && self.atom_count() > 1 {
            self.relax_worst_free_atom()?;
        }
        self.post_mutation();
        Ok(())
    }

    /// Take an atom out, refine its position against the rest, put it back.
    pub fn relax_atom(&mut self, index: usize) -> Result<()> {
        if index >= self.atom_count() {
            return Err(LigaError::IndexOutOfRange {
                index,
                len: self.atom_count(),
            });
        }
        debug_assert!(!self.atom(index).fixed, "relax of a fixed atom");
        let mut atom = self.pop_atom(index)?;
        self.relax_external_atom(&mut atom);
        self.add_atom(atom)
    }

    /// Least-squares refinement of an external atom against this
    /// structure; a no-op below three atoms.
    pub fn relax_external_atom(&self, atom: &mut Atom) {
        match self {
            Structure::Molecule(m) => m.relax_external(atom),
            Structure::Crystal(c) => c.relax_external(atom),
        }
    }

    fn relax_worst_free_atom(&mut self) -> Result<()> {
        let worst = self
            .atoms()
            .iter()
            .enumerate()
            .max_by(|a, b| {
                a.1.free_badness()
                    .partial_cmp(&b.1.free_badness())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, atom)| (i, atom.badness(), atom.fixed));
        if let Some((index, badness, fixed)) = worst {
            if eps_gt(badness, 0.0) && !fixed {
                self.relax_atom(index)?;
            }
        }
        Ok(())
    }

    pub fn write_to<W: std::io::Write>(
        &self,
        out: &mut W,
        format: StructureFormat,
    ) -> std::io::Result<()> {
        match format {
            StructureFormat::Xyz => io::xyz::write_xyz(out, self.atoms()),
            StructureFormat::RawXyz => io::xyz::write_rawxyz(out, self.atoms()),
            StructureFormat::AtomEye => io::atomeye::write_atomeye(out, self.atoms()),
        }
    }

    pub fn write_file(&self, path: &Path, format: StructureFormat) -> Result<()> {
        let mut buffer = Vec::new();
        let label = path.display().to_string();
        self.write_to(&mut buffer, format)
            .map_err(|source| IoError::Write {
                path: label.clone(),
                source,
            })?;
        std::fs::write(path, buffer).map_err(|source| IoError::Write {
            path: label,
            source,
        })?;
        Ok(())
    }
}
