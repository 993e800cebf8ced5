use crate::engine::error::Result;
use crate::engine::structures::Structure;
use crate::engine::utils::sampling;
use rand::Rng;
use rand_distr::{Beta, Distribution};

/// Prior success shares of the triangulation kinds (linear, planar,
/// spatial), used until a kind has recorded history.
const PRIOR_SHARES: [f64; 3] = [2.0 / 18.0, 4.0 / 18.0, 12.0 / 18.0];

/// One rung of the liga ladder: a bounded pool of structures at a fixed
/// atom count, with running success statistics per triangulation kind.
#[derive(Debug)]
pub struct Division {
    members: Vec<Structure>,
    fullsize: usize,
    level: usize,
    trials: f64,
    acc_triang: [u64; 3],
    tot_triang: [u64; 3],
    est_triang: [usize; 3],
}

impl Division {
    pub fn new(fullsize: usize, level: usize) -> Self {
        Self {
            members: Vec::new(),
            fullsize,
            level,
            trials: 0.0,
            acc_triang: [0; 3],
            tot_triang: [0; 3],
            est_triang: [0; 3],
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn full(&self) -> bool {
        self.members.len() >= self.fullsize
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn members(&self) -> &[Structure] {
        &self.members
    }

    pub fn get(&self, index: usize) -> &Structure {
        &self.members[index]
    }

    pub fn push(&mut self, structure: Structure) {
        debug_assert_eq!(structure.atom_count(), self.level);
        self.members.push(structure);
    }

    pub fn remove(&mut self, index: usize) -> Structure {
        self.members.remove(index)
    }

    pub fn replace(&mut self, index: usize, structure: Structure) -> Structure {
        debug_assert_eq!(structure.atom_count(), self.level);
        std::mem::replace(&mut self.members[index], structure)
    }

    pub fn assign_trials(&mut self, trials: f64) {
        self.trials = trials;
    }

    pub fn trials(&self) -> f64 {
        self.trials
    }

    /// Fitness-weighted pick: reciprocal normalised badness.
    pub fn find_winner<R: Rng>(&self, rng: &mut R) -> Result<usize> {
        let costs: Vec<f64> = self.members.iter().map(Structure::cost).collect();
        let fitness = sampling::cost_to_fitness(&costs);
        Ok(sampling::weighted_int(&fitness, rng)?)
    }

    /// Cost-weighted pick: normalised badness.
    pub fn find_looser<R: Rng>(&self, rng: &mut R) -> Result<usize> {
        let costs: Vec<f64> = self.members.iter().map(Structure::cost).collect();
        Ok(sampling::weighted_int(&costs, rng)?)
    }

    pub fn find_best(&self) -> Option<usize> {
        self.members
            .iter()
            .enumerate()
            .min_by(|a, b| {
                a.1.badness()
                    .partial_cmp(&b.1.badness())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
    }

    pub fn norm_badness(&self) -> f64 {
        if self.members.is_empty() {
            return 0.0;
        }
        let total: f64 = self.members.iter().map(Structure::cost).sum();
        total / self.members.len() as f64
    }

    /// Split the trial budget over triangulation kinds by drawing success
    /// probabilities from the Beta posterior of each kind's record, then
    /// zeroing the kinds that exceed the structure's degrees of freedom.
    pub fn estimate_triangulations<R: Rng>(&mut self, ndim: usize, rng: &mut R) -> [usize; 3] {
        let mut p = PRIOR_SHARES;
        for i in 0..3 {
            if self.tot_triang[i] == 0 {
                continue;
            }
            let a = self.acc_triang[i] as f64 + 1.0;
            let b = (self.tot_triang[i] - self.acc_triang[i]) as f64 + 1.0;
            if let Ok(beta) = Beta::new(a, b) {
                p[i] = beta.sample(rng);
            }
        }
        let nd = ndim.min(self.level);
        if nd < 1 {
            p[0] = 0.0;
        }
        if nd < 2 {
            p[1] = 0.0;
        }
        if nd < 3 {
            p[2] = 0.0;
        }
        let ptot: f64 = p.iter().sum();
        if ptot > 0.0 {
            for share in &mut p {
                *share /= ptot;
            }
        }
        for i in 0..3 {
            self.est_triang[i] = (p[i] * self.trials).ceil() as usize;
        }
        self.est_triang
    }

    /// Fold a promoted structure's new atoms back into the success
    /// counters and charge the estimated trials.
    pub fn note_triangulations(&mut self, advanced: &Structure) {
        for atom in advanced.atoms().iter().skip(self.level) {
            self.acc_triang[atom.kind.index()] += 1;
        }
        for i in 0..3 {
            self.tot_triang[i] += self.est_triang[i] as u64;
            self.est_triang[i] = 0;
        }
    }
}
