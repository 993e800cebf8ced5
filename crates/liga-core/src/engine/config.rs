use crate::engine::cost::PenaltyKind;
use crate::engine::structures::AtomFilter;
use std::fmt;
use std::sync::Arc;

/// Knobs of the per-structure fitting machinery: cost tolerances, evolve
/// behaviour and optional candidate filters.
#[derive(Clone)]
pub struct FitParams {
    /// Distance-resolution tolerance; a target distance is consumed by a
    /// pair only when the mismatch stays below this.
    pub tol_dd: f64,
    /// Tolerance of normalised badness, scales the candidate selection
    /// window in evolve.
    pub tol_nbad: f64,
    pub penalty: PenaltyKind,
    /// Fraction of `tol_nbad` per atom defining the evolve selection range.
    pub promotefrac: f64,
    /// Keep adding atoms greedily within one evolve call.
    pub promotejump: bool,
    /// Relax the worst free atom after each evolve insertion.
    pub promoterelax: bool,
    /// Relax the worst free atom after degenerate removals.
    pub demoterelax: bool,
    /// Probability of the exhaustive small-structure scan.
    pub lookout_prob: f64,
    /// User-defined candidate filters, checked before cost evaluation.
    pub filters: Vec<Arc<dyn AtomFilter>>,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            tol_dd: 0.1,
            tol_nbad: 0.05 * 0.05,
            penalty: PenaltyKind::Pow2,
            promotefrac: 0.1,
            promotejump: true,
            promoterelax: false,
            demoterelax: false,
            lookout_prob: 0.0,
            filters: Vec::new(),
        }
    }
}

impl fmt::Debug for FitParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FitParams")
            .field("tol_dd", &self.tol_dd)
            .field("tol_nbad", &self.tol_nbad)
            .field("penalty", &self.penalty)
            .field("promotefrac", &self.promotefrac)
            .field("promotejump", &self.promotejump)
            .field("promoterelax", &self.promoterelax)
            .field("demoterelax", &self.demoterelax)
            .field("lookout_prob", &self.lookout_prob)
            .field("filters", &self.filters.len())
            .finish()
    }
}

/// Parameters of the division tournament.
#[derive(Debug, Clone)]
pub struct LigaParams {
    /// Capacity of each division.
    pub ligasize: usize,
    /// Dimensionality of the search space; caps which triangulation kinds
    /// are available at low atom counts.
    pub ndim: usize,
    /// Target normalised badness of a full structure.
    pub tol_bad: f64,
    /// Number of recent seasons in the improvement-rate window.
    pub logsize: usize,
    pub eprob_min: f64,
    pub eprob_max: f64,
    /// Probability of forcing a full-build evolution burst.
    pub bustprob: f64,
    pub dist_trials: usize,
    pub tri_trials: usize,
    pub pyr_trials: usize,
    /// Wall-clock budget in seconds; 0 disables the limit.
    pub maxcputime: f64,
    /// Seed of the single pseudo-random stream; 0 seeds from entropy.
    pub seed: u64,
}

impl Default for LigaParams {
    fn default() -> Self {
        Self {
            ligasize: 10,
            ndim: 3,
            tol_bad: 1.0e-4,
            logsize: 10,
            eprob_min: 0.25,
            eprob_max: 0.75,
            bustprob: 0.01,
            dist_trials: 10,
            tri_trials: 20,
            pyr_trials: 1000,
            maxcputime: 0.0,
            seed: 0,
        }
    }
}

impl LigaParams {
    /// Per-season trial budget of one division.
    pub fn season_trials(&self) -> f64 {
        (self.dist_trials + self.tri_trials + self.pyr_trials) as f64
    }
}

/// Which structure variant the search runs over.
#[derive(Debug, Clone)]
pub enum StructureMode {
    Molecule,
    Crystal {
        /// a, b, c, alpha, beta, gamma.
        latpar: [f64; 6],
        /// Distance-table crop radius; 0 keeps the whole table.
        rmax: f64,
    },
}

/// Complete search configuration assembled by the caller.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub fit: FitParams,
    pub liga: LigaParams,
    pub mode: StructureMode,
    /// Target atom count; defaults to the molecule estimate from the table
    /// size and is required for crystals.
    pub natoms: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            fit: FitParams::default(),
            liga: LigaParams::default(),
            mode: StructureMode::Molecule,
            natoms: None,
        }
    }
}
