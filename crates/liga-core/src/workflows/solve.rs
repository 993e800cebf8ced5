use crate::core::models::distance_table::DistanceTable;
use crate::core::models::lattice::Lattice;
use crate::engine::config::{SearchConfig, StructureMode};
use crate::engine::error::{LigaError, Result};
use crate::engine::liga::{Liga, Outcome};
use crate::engine::progress::ProgressReporter;
use crate::engine::structures::{Crystal, Molecule, Structure};
use nalgebra::Point3;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, instrument};

/// Result of one complete search run.
#[derive(Debug)]
pub struct Solution {
    pub solved: bool,
    pub iterations: u64,
    /// Best full structure seen, if any.
    pub structure: Option<Structure>,
}

/// Run the liga search against a target distance table.
///
/// `initial` positions, when given, seed the starting structure so the
/// tournament begins from a partial solution instead of an empty box.
#[instrument(skip_all, name = "liga_workflow")]
pub fn run(
    target: &DistanceTable,
    initial: Option<&[Point3<f64>]>,
    config: &SearchConfig,
    reporter: &ProgressReporter,
) -> Result<Solution> {
    let mut structure = build_structure(target, config)?;
    if let Some(positions) = initial {
        structure.set_positions(positions)?;
        info!(
            atoms = structure.atom_count(),
            "seeded the search from an initial structure"
        );
    }
    let mut rng = seeded_rng(config.liga.seed);
    let mut liga = Liga::new(structure, config.liga.clone())?;
    let result = liga.run(&mut rng, reporter)?;
    Ok(Solution {
        solved: result.outcome == Outcome::Solved,
        iterations: result.iterations,
        structure: result.champion,
    })
}

fn build_structure(target: &DistanceTable, config: &SearchConfig) -> Result<Structure> {
    match &config.mode {
        StructureMode::Molecule => {
            let mut molecule = Molecule::new(target.clone(), config.fit.clone())?;
            if let Some(natoms) = config.natoms {
                molecule.set_max_atom_count(natoms)?;
            }
            Ok(Structure::from(molecule))
        }
        StructureMode::Crystal { latpar, rmax } => {
            let natoms = config.natoms.ok_or_else(|| {
                LigaError::InvalidStructure("crystal search requires an atom count".into())
            })?;
            let [a, b, c, alpha, beta, gamma] = *latpar;
            let lattice = Lattice::new(a, b, c, alpha, beta, gamma)?;
            let crystal = Crystal::new(target, lattice, *rmax, natoms, config.fit.clone())?;
            Ok(Structure::from(crystal))
        }
    }
}

fn seeded_rng(seed: u64) -> StdRng {
    if seed != 0 {
        StdRng::seed_from_u64(seed)
    } else {
        StdRng::from_entropy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::LigaParams;

    #[test]
    fn molecule_search_solves_a_triangle() {
        let target = DistanceTable::new(vec![1.0, 1.0, 1.0]).unwrap();
        let config = SearchConfig {
            liga: LigaParams {
                seed: 31,
                ligasize: 4,
                maxcputime: 30.0,
                ..LigaParams::default()
            },
            ..SearchConfig::default()
        };
        let solution = run(&target, None, &config, &ProgressReporter::new()).unwrap();
        assert!(solution.solved);
        assert_eq!(solution.structure.unwrap().atom_count(), 3);
    }

    #[test]
    fn degenerate_cell_parameters_are_an_error_not_a_panic() {
        let target = DistanceTable::new(vec![1.0]).unwrap();
        let config = SearchConfig {
            mode: StructureMode::Crystal {
                latpar: [0.0, 1.0, 1.0, 90.0, 90.0, 90.0],
                rmax: 1.5,
            },
            natoms: Some(2),
            ..SearchConfig::default()
        };
        let result = run(&target, None, &config, &ProgressReporter::new());
        assert!(matches!(result, Err(LigaError::InvalidLattice(_))));
    }

    #[test]
    fn crystal_mode_requires_an_atom_count() {
        let target = DistanceTable::new(vec![1.0]).unwrap();
        let config = SearchConfig {
            mode: StructureMode::Crystal {
                latpar: [1.0, 1.0, 1.0, 90.0, 90.0, 90.0],
                rmax: 1.5,
            },
            ..SearchConfig::default()
        };
        let result = run(&target, None, &config, &ProgressReporter::new());
        assert!(matches!(result, Err(LigaError::InvalidStructure(_))));
    }
}
