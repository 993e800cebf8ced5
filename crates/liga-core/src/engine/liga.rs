use crate::engine::config::LigaParams;
use crate::engine::division::Division;
use crate::engine::error::{LigaError, Result};
use crate::engine::progress::{Progress, ProgressReporter, SearchAction};
use crate::engine::structures::Structure;
use crate::engine::utils::sampling;
use rand::Rng;
use std::collections::VecDeque;
use std::time::Instant;
use tracing::{debug, info};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A full structure reached the target normalised badness.
    Solved,
    /// The wall-clock budget expired first.
    TimedOut,
}

#[derive(Debug)]
pub struct SearchResult {
    pub outcome: Outcome,
    pub champion: Option<Structure>,
    pub iterations: u64,
}

/// The division tournament.
///
/// One division per atom count from 0 to the target size races partial
/// structures: winners of a division evolve one atom and promote into the
/// next, loosers of the top occupied division shed atoms and drop back.
/// A season-windowed improvement rate steers the evolve-versus-degenerate
/// probability, and an occasional "bust" forces a full build-out.
pub struct Liga {
    divisions: Vec<Division>,
    params: LigaParams,
    world_champ: Option<Structure>,
    best_mnb: Vec<f64>,
    improved: VecDeque<bool>,
    iteration: u64,
}

impl Liga {
    pub fn new(seed: Structure, params: LigaParams) -> Result<Self> {
        let top_level = seed.max_atom_count();
        if top_level == 0 {
            return Err(LigaError::InvalidStructure(
                "cannot race structures with zero target atoms".into(),
            ));
        }
        let mut divisions: Vec<Division> = (0..=top_level)
            .map(|level| {
                let mut division = Division::new(params.ligasize, level);
                division.assign_trials(params.season_trials());
                division
            })
            .collect();
        let seed_level = seed.atom_count();
        if seed_level != 0 {
            // an empty sibling keeps the bottom rung restartable
            let mut empty = seed.clone();
            empty.clear();
            divisions[0].push(empty);
        }
        let world_champ = seed.full().then(|| seed.clone());
        divisions[seed_level].push(seed);
        let improved = VecDeque::from(vec![true; params.logsize.max(1)]);
        Ok(Self {
            divisions,
            world_champ,
            best_mnb: vec![f64::MAX; top_level + 1],
            improved,
            iteration: 0,
            params,
        })
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn world_champion(&self) -> Option<&Structure> {
        self.world_champ.as_ref()
    }

    fn top_level(&self) -> usize {
        self.divisions.len() - 1
    }

    fn solved(&self) -> bool {
        self.world_champ
            .as_ref()
            .is_some_and(|champ| champ.full() && champ.cost() <= self.params.tol_bad)
    }

    /// Drive iterations until a solution or the time budget runs out.
    pub fn run<R: Rng>(
        &mut self,
        rng: &mut R,
        reporter: &ProgressReporter,
    ) -> Result<SearchResult> {
        let started = Instant::now();
        info!(
            target_atoms = self.top_level(),
            ligasize = self.params.ligasize,
            "starting liga tournament"
        );
        loop {
            if self.solved() {
                let champion = self.world_champ.clone();
                if let Some(champ) = &champion {
                    reporter.report(Progress::Solved {
                        iteration: self.iteration,
                        structure: champ,
                    });
                }
                info!(iterations = self.iteration, "solution found");
                return Ok(SearchResult {
                    outcome: Outcome::Solved,
                    champion,
                    iterations: self.iteration,
                });
            }
            if self.params.maxcputime > 0.0
                && started.elapsed().as_secs_f64() > self.params.maxcputime
            {
                info!(
                    iterations = self.iteration,
                    "time budget exhausted before a solution"
                );
                return Ok(SearchResult {
                    outcome: Outcome::TimedOut,
                    champion: self.world_champ.clone(),
                    iterations: self.iteration,
                });
            }
            self.play_iteration(rng, reporter)?;
        }
    }

    fn play_iteration<R: Rng>(
        &mut self,
        rng: &mut R,
        reporter: &ProgressReporter,
    ) -> Result<()> {
        self.iteration += 1;
        let impr_rate =
            self.improved.iter().filter(|&&i| i).count() as f64 / self.improved.len() as f64;
        let bust_now = impr_rate >= 0.5 && rng.gen::<f64>() < self.params.bustprob;
        let top = self.top_level();
        let sources: Vec<usize> = self
            .divisions
            .iter()
            .enumerate()
            .filter(|(level, division)| *level < top && !division.is_empty())
            .map(|(level, _)| level)
            .collect();
        let highest_occupied = self
            .divisions
            .iter()
            .rposition(|division| !division.is_empty())
            .unwrap_or(0);
        let evolve_probability = if sources.is_empty() {
            0.0
        } else if highest_occupied <= 1 || bust_now {
            1.0
        } else {
            impr_rate * (self.params.eprob_max - self.params.eprob_min) + self.params.eprob_min
        };
        if rng.gen::<f64>() < evolve_probability {
            self.evolve_step(&sources, bust_now, rng, reporter)
        } else {
            self.degenerate_step(rng, reporter)
        }
    }

    /// Promote: clone a division winner, grow it by at least one atom and
    /// deposit it one or more rungs up.
    fn evolve_step<R: Rng>(
        &mut self,
        sources: &[usize],
        bust_now: bool,
        rng: &mut R,
        reporter: &ProgressReporter,
    ) -> Result<()> {
        // levels are weighted by their share of the season trial budget
        let weights: Vec<f64> = sources.iter().map(|&level| (level + 1) as f64).collect();
        let source_level = sources[sampling::weighted_int(&weights, rng)?];
        let parent_index = self.divisions[source_level].find_winner(rng)?;
        let mut child = self.divisions[source_level].get(parent_index).clone();
        let ndim = self.params.ndim;
        let est = self.divisions[source_level].estimate_triangulations(ndim, rng);
        child.evolve(&est, rng)?;
        self.divisions[source_level].note_triangulations(&child);
        if bust_now {
            // force the build-out all the way to the top
            while !child.full() {
                let level = child.atom_count();
                let est = self.divisions[level].estimate_triangulations(ndim, rng);
                let stats = child.evolve(&est, rng)?;
                self.divisions[level].note_triangulations(&child);
                if stats.accepted.iter().sum::<usize>() == 0 {
                    break;
                }
            }
        }
        debug!(
            iteration = self.iteration,
            step = "E",
            atoms = child.atom_count(),
            nbad = child.cost(),
            "promoted from level {source_level}"
        );
        self.finish_step(child, SearchAction::Evolve, rng, reporter)
    }

    /// Demote: the looser of the highest occupied division sheds atoms
    /// scaled to how far it is from the target badness.
    fn degenerate_step<R: Rng>(
        &mut self,
        rng: &mut R,
        reporter: &ProgressReporter,
    ) -> Result<()> {
        let Some(division_level) = self
            .divisions
            .iter()
            .rposition(|division| division.level() > 0 && !division.is_empty())
        else {
            return Ok(());
        };
        let looser_index = self.divisions[division_level].find_looser(rng)?;
        let mut structure = self.divisions[division_level].remove(looser_index);
        let nbad = structure.cost();
        let npop = if nbad > self.params.tol_bad {
            let natoms = structure.atom_count() as f64;
            let hi = (natoms / 4.0 * (1.0 - self.params.tol_bad / nbad)).ceil() as usize;
            1 + rng.gen_range(0..hi.max(1))
        } else {
            1
        };
        structure.degenerate(npop, rng)?;
        debug!(
            iteration = self.iteration,
            step = "D",
            atoms = structure.atom_count(),
            nbad = structure.cost(),
            "demoted from level {division_level}"
        );
        self.finish_step(structure, SearchAction::Degenerate, rng, reporter)
    }

    /// Book-keep a finished step and insert the structure into its new
    /// division, displacing that division's looser when it is full.
    fn finish_step<R: Rng>(
        &mut self,
        structure: Structure,
        action: SearchAction,
        rng: &mut R,
        reporter: &ProgressReporter,
    ) -> Result<()> {
        self.record_progress(&structure);
        reporter.report(Progress::Iteration {
            iteration: self.iteration,
            action,
            structure: &structure,
        });
        if structure.full() {
            let better = self
                .world_champ
                .as_ref()
                .is_none_or(|champ| structure.cost() < champ.cost());
            if better {
                info!(
                    iteration = self.iteration,
                    nbad = structure.cost(),
                    "new world champion"
                );
                reporter.report(Progress::NewChampion {
                    iteration: self.iteration,
                    structure: &structure,
                });
                self.world_champ = Some(structure.clone());
            }
        }
        let level = structure.atom_count();
        let division = &mut self.divisions[level];
        if !division.full() {
            division.push(structure);
        } else {
            let looser = division.find_looser(rng)?;
            division.replace(looser, structure);
        }
        Ok(())
    }

    /// Track the lowest normalised badness ever seen at each level; a
    /// season improves when its structure beats that record.
    fn record_progress(&mut self, structure: &Structure) {
        let level = structure.atom_count();
        let nbad = structure.cost();
        let improved_now = nbad < self.best_mnb[level];
        if improved_now {
            self.best_mnb[level] = nbad;
        } else if self.best_mnb[level] < self.params.tol_bad {
            // sub-target records would otherwise count as eternal stalls
            self.best_mnb[level] = self.params.tol_bad;
        }
        self.improved.push_back(improved_now);
        while self.improved.len() > self.params.logsize.max(1) {
            self.improved.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::distance_table::DistanceTable;
    use crate::engine::config::FitParams;
    use crate::engine::structures::Molecule;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn triangle_liga(params: LigaParams) -> Liga {
        let table = DistanceTable::new(vec![1.0, 1.0, 1.0]).unwrap();
        let molecule = Molecule::new(table, FitParams::default()).unwrap();
        Liga::new(Structure::from(molecule), params).unwrap()
    }

    #[test]
    fn solves_the_equilateral_triangle() {
        let params = LigaParams {
            ligasize: 4,
            maxcputime: 30.0,
            ..LigaParams::default()
        };
        let mut liga = triangle_liga(params);
        let mut rng = StdRng::seed_from_u64(17);
        let result = liga.run(&mut rng, &ProgressReporter::new()).unwrap();
        assert_eq!(result.outcome, Outcome::Solved);
        let champion = result.champion.expect("solved runs carry a champion");
        assert_eq!(champion.atom_count(), 3);
        assert!(champion.cost() <= 1.0e-4);
        // the three realised pair distances reproduce the target
        for i in 0..3 {
            for j in (i + 1)..3 {
                let d = nalgebra::distance(
                    &champion.atom(i).position,
                    &champion.atom(j).position,
                );
                assert!((d - 1.0).abs() < 0.05, "pair distance {d}");
            }
        }
    }

    #[test]
    fn time_budget_ends_unsolvable_runs() {
        // distances of a square's sides only: no 3-atom exact solution is
        // required, but the budget is too small to matter either way
        let table = DistanceTable::new(vec![1.0, 1.0, 1.4, 1.9, 2.6, 3.9]).unwrap();
        let molecule = Molecule::new(table, FitParams::default()).unwrap();
        let params = LigaParams {
            maxcputime: 0.05,
            tol_bad: 1.0e-12,
            ..LigaParams::default()
        };
        let mut liga = Liga::new(Structure::from(molecule), params).unwrap();
        let mut rng = StdRng::seed_from_u64(23);
        let result = liga.run(&mut rng, &ProgressReporter::new()).unwrap();
        assert_eq!(result.outcome, Outcome::TimedOut);
    }

    #[test]
    fn progress_events_reach_the_callback() {
        use std::cell::RefCell;
        let params = LigaParams {
            ligasize: 4,
            maxcputime: 30.0,
            ..LigaParams::default()
        };
        let mut liga = triangle_liga(params);
        let mut rng = StdRng::seed_from_u64(29);
        let iterations = RefCell::new(0u64);
        let solved = RefCell::new(false);
        let reporter = ProgressReporter::with_callback(Box::new(|event| match event {
            Progress::Iteration { .. } => *iterations.borrow_mut() += 1,
            Progress::Solved { .. } => *solved.borrow_mut() = true,
            Progress::NewChampion { .. } => {}
        }));
        liga.run(&mut rng, &reporter).unwrap();
        assert!(*iterations.borrow() > 0);
        assert!(*solved.borrow());
    }
}
