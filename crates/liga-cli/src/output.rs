use crate::config::RunParams;
use crate::error::Result;
use liga_core::core::io::StructureFormat;
use liga_core::engine::progress::Progress;
use liga_core::engine::structures::Structure;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Writes live snapshot and frame files as the search progresses.
///
/// Snapshots are gated by monotone improvement: only a structure with at
/// least as many atoms as any earlier snapshot and a lower normalised
/// badness gets written.  Frames are periodic, suffixed with the
/// iteration number.
pub struct OutputWriter {
    outfmt: StructureFormat,
    snapshot: Option<PathBuf>,
    snaprate: usize,
    snap_countdown: usize,
    snap_largest: usize,
    snap_best_nbad: f64,
    frames: Option<PathBuf>,
    framesrate: usize,
    frames_countdown: usize,
}

impl OutputWriter {
    pub fn new(params: &RunParams) -> Self {
        Self {
            outfmt: params.outfmt,
            snapshot: params.snapshot.clone(),
            snaprate: params.snaprate,
            snap_countdown: params.snaprate,
            snap_largest: 0,
            snap_best_nbad: f64::MAX,
            frames: params.frames.clone(),
            framesrate: params.framesrate,
            frames_countdown: params.framesrate,
        }
    }

    pub fn on_progress(&mut self, event: &Progress) {
        if let Progress::Iteration {
            iteration,
            structure,
            ..
        } = event
        {
            if let Err(error) = self.save_snapshot(structure) {
                warn!(%error, "snapshot write failed");
            }
            if let Err(error) = self.save_frame(*iteration, structure) {
                warn!(%error, "frame write failed");
            }
        }
    }

    fn save_snapshot(&mut self, structure: &Structure) -> Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        if self.snaprate == 0 {
            return Ok(());
        }
        self.snap_countdown = self.snap_countdown.saturating_sub(1);
        if self.snap_countdown > 0 {
            return Ok(());
        }
        let natoms = structure.atom_count();
        let nbad = structure.cost();
        if natoms >= self.snap_largest && nbad < self.snap_best_nbad {
            structure.write_file(path, self.outfmt)?;
            self.snap_largest = natoms;
            self.snap_best_nbad = nbad;
            self.snap_countdown = self.snaprate;
            debug!(path = %path.display(), natoms, nbad, "snapshot written");
        }
        Ok(())
    }

    fn save_frame(&mut self, iteration: u64, structure: &Structure) -> Result<()> {
        let Some(base) = &self.frames else {
            return Ok(());
        };
        if self.framesrate == 0 {
            return Ok(());
        }
        self.frames_countdown = self.frames_countdown.saturating_sub(1);
        if self.frames_countdown > 0 {
            return Ok(());
        }
        let mut path = base.as_os_str().to_owned();
        path.push(format!(".{iteration}"));
        structure.write_file(path.as_ref(), self.outfmt)?;
        self.frames_countdown = self.framesrate;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liga_core::core::models::distance_table::DistanceTable;
    use liga_core::engine::config::FitParams;
    use liga_core::engine::progress::SearchAction;
    use liga_core::engine::structures::Molecule;
    use nalgebra::Point3;

    fn pair_structure(offset: f64) -> Structure {
        let table = DistanceTable::new(vec![1.0, 1.0, 1.0]).unwrap();
        let mut molecule = Molecule::new(table, FitParams::default()).unwrap();
        molecule.add_position(Point3::new(0.0, 0.0, 0.0)).unwrap();
        molecule
            .add_position(Point3::new(1.0 + offset, 0.0, 0.0))
            .unwrap();
        Structure::from(molecule)
    }

    fn iteration_event(iteration: u64, structure: &Structure) -> Progress<'_> {
        Progress::Iteration {
            iteration,
            action: SearchAction::Evolve,
            structure,
        }
    }

    #[test]
    fn snapshots_only_record_improvements() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("live.xyz");
        let params = RunParams {
            snapshot: Some(snapshot.clone()),
            snaprate: 1,
            outfmt: StructureFormat::Xyz,
            ..RunParams::default()
        };
        let mut writer = OutputWriter::new(&params);

        let worse = pair_structure(0.09);
        writer.on_progress(&iteration_event(1, &worse));
        assert!(snapshot.exists());
        let first = std::fs::read_to_string(&snapshot).unwrap();

        // no improvement: equal size and higher badness leaves the file alone
        let worst = pair_structure(0.099);
        writer.on_progress(&iteration_event(2, &worst));
        assert_eq!(std::fs::read_to_string(&snapshot).unwrap(), first);

        let better = pair_structure(0.0);
        writer.on_progress(&iteration_event(3, &better));
        assert_ne!(std::fs::read_to_string(&snapshot).unwrap(), first);
    }

    #[test]
    fn frames_carry_the_iteration_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let frames = dir.path().join("frame");
        let params = RunParams {
            frames: Some(frames.clone()),
            framesrate: 2,
            ..RunParams::default()
        };
        let mut writer = OutputWriter::new(&params);
        let structure = pair_structure(0.0);
        writer.on_progress(&iteration_event(1, &structure));
        writer.on_progress(&iteration_event(2, &structure));
        assert!(!dir.path().join("frame.1").exists());
        assert!(dir.path().join("frame.2").exists());
    }
}
