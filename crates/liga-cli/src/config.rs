use crate::error::{CliError, Result};
use liga_core::core::io::StructureFormat;
use liga_core::engine::config::{FitParams, LigaParams, SearchConfig, StructureMode};
use liga_core::engine::cost::PenaltyKind;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Complete set of run parameters, assembled from built-in defaults, the
/// optional TOML parameter file, and `key=value` command-line overrides
/// (strongest last).
#[derive(Debug, Clone)]
pub struct RunParams {
    // IO
    pub distfile: Option<PathBuf>,
    pub inistru: Option<PathBuf>,
    pub outstru: Option<PathBuf>,
    pub outfmt: StructureFormat,
    pub snapshot: Option<PathBuf>,
    pub snaprate: usize,
    pub frames: Option<PathBuf>,
    pub framesrate: usize,
    // fit
    pub tol_dd: f64,
    pub tol_bad: f64,
    pub tol_nbad: f64,
    pub penalty: PenaltyKind,
    pub promotefrac: f64,
    pub promoterelax: bool,
    pub demoterelax: bool,
    pub promotejump: bool,
    pub lookout_prob: f64,
    // liga
    pub seed: u64,
    pub logsize: usize,
    pub eprob_min: f64,
    pub eprob_max: f64,
    pub bustprob: f64,
    pub dist_trials: usize,
    pub tri_trials: usize,
    pub pyr_trials: usize,
    pub ligasize: usize,
    pub ndim: usize,
    pub maxcputime: f64,
    // structure
    pub crystal: bool,
    pub latpar: [f64; 6],
    pub rmax: f64,
    pub natoms: Option<usize>,
}

impl Default for RunParams {
    fn default() -> Self {
        let fit = FitParams::default();
        let liga = LigaParams::default();
        Self {
            distfile: None,
            inistru: None,
            outstru: None,
            outfmt: StructureFormat::RawXyz,
            snapshot: None,
            snaprate: 100,
            frames: None,
            framesrate: 100,
            tol_dd: fit.tol_dd,
            tol_bad: liga.tol_bad,
            tol_nbad: fit.tol_nbad,
            penalty: fit.penalty,
            promotefrac: fit.promotefrac,
            promoterelax: fit.promoterelax,
            demoterelax: fit.demoterelax,
            promotejump: fit.promotejump,
            lookout_prob: fit.lookout_prob,
            seed: liga.seed,
            logsize: liga.logsize,
            eprob_min: liga.eprob_min,
            eprob_max: liga.eprob_max,
            bustprob: liga.bustprob,
            dist_trials: liga.dist_trials,
            tri_trials: liga.tri_trials,
            pyr_trials: liga.pyr_trials,
            ligasize: liga.ligasize,
            ndim: liga.ndim,
            maxcputime: liga.maxcputime,
            crystal: false,
            latpar: [1.0, 1.0, 1.0, 90.0, 90.0, 90.0],
            rmax: 0.0,
            natoms: None,
        }
    }
}

/// File-layer view of the parameter file; every key optional.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct ParFile {
    distfile: Option<PathBuf>,
    inistru: Option<PathBuf>,
    outstru: Option<PathBuf>,
    outfmt: Option<String>,
    snapshot: Option<PathBuf>,
    snaprate: Option<usize>,
    frames: Option<PathBuf>,
    framesrate: Option<usize>,
    tol_dd: Option<f64>,
    tol_bad: Option<f64>,
    tol_nbad: Option<f64>,
    penalty: Option<String>,
    promotefrac: Option<f64>,
    /// Legacy alias of `promotefrac`.
    evolve_frac: Option<f64>,
    promoterelax: Option<bool>,
    demoterelax: Option<bool>,
    promotejump: Option<bool>,
    lookout_prob: Option<f64>,
    seed: Option<u64>,
    logsize: Option<usize>,
    eprob_min: Option<f64>,
    eprob_max: Option<f64>,
    bustprob: Option<f64>,
    dist_trials: Option<usize>,
    tri_trials: Option<usize>,
    pyr_trials: Option<usize>,
    ligasize: Option<usize>,
    ndim: Option<usize>,
    maxcputime: Option<f64>,
    crystal: Option<bool>,
    latpar: Option<Vec<f64>>,
    rmax: Option<f64>,
    natoms: Option<usize>,
}

impl RunParams {
    pub fn apply_parfile(&mut self, path: &Path) -> Result<()> {
        let label = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|e| CliError::ParFile {
            path: label.clone(),
            message: e.to_string(),
        })?;
        let parsed: ParFile = toml::from_str(&text).map_err(|e| CliError::ParFile {
            path: label.clone(),
            message: e.to_string(),
        })?;
        self.merge(parsed)
            .map_err(|e| CliError::ParFile {
                path: label,
                message: e.to_string(),
            })?;
        debug!(path = %path.display(), "parameter file applied");
        Ok(())
    }

    fn merge(&mut self, file: ParFile) -> Result<()> {
        macro_rules! take {
            ($field:ident) => {
                if let Some(value) = file.$field {
                    self.$field = value;
                }
            };
        }
        macro_rules! take_path {
            ($field:ident) => {
                if file.$field.is_some() {
                    self.$field = file.$field;
                }
            };
        }
        take_path!(distfile);
        take_path!(inistru);
        take_path!(outstru);
        take_path!(snapshot);
        take_path!(frames);
        take!(snaprate);
        take!(framesrate);
        take!(tol_dd);
        take!(tol_bad);
        take!(tol_nbad);
        take!(promotefrac);
        take!(promoterelax);
        take!(demoterelax);
        take!(promotejump);
        take!(lookout_prob);
        take!(seed);
        take!(logsize);
        take!(eprob_min);
        take!(eprob_max);
        take!(bustprob);
        take!(dist_trials);
        take!(tri_trials);
        take!(pyr_trials);
        take!(ligasize);
        take!(ndim);
        take!(maxcputime);
        take!(crystal);
        take!(rmax);
        if file.natoms.is_some() {
            self.natoms = file.natoms;
        }
        if let Some(frac) = file.evolve_frac {
            self.promotefrac = frac;
        }
        if let Some(fmt) = file.outfmt {
            self.outfmt = fmt.parse().map_err(CliError::ParseArgs)?;
        }
        if let Some(penalty) = file.penalty {
            self.penalty = penalty.parse().map_err(CliError::ParseArgs)?;
        }
        if let Some(latpar) = file.latpar {
            self.latpar = parse_latpar_values(&latpar)?;
        }
        Ok(())
    }

    /// Apply one `key=value` command-line override.
    pub fn apply_override(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "distfile" => self.distfile = Some(PathBuf::from(value)),
            "inistru" => self.inistru = Some(PathBuf::from(value)),
            "outstru" => self.outstru = Some(PathBuf::from(value)),
            "outfmt" => self.outfmt = value.parse().map_err(CliError::ParseArgs)?,
            "snapshot" => self.snapshot = Some(PathBuf::from(value)),
            "snaprate" => self.snaprate = parse_value(key, value)?,
            "frames" => self.frames = Some(PathBuf::from(value)),
            "framesrate" => self.framesrate = parse_value(key, value)?,
            "tol_dd" => self.tol_dd = parse_value(key, value)?,
            "tol_bad" => self.tol_bad = parse_value(key, value)?,
            "tol_nbad" => self.tol_nbad = parse_value(key, value)?,
            "penalty" => self.penalty = value.parse().map_err(CliError::ParseArgs)?,
            "promotefrac" | "evolve_frac" => self.promotefrac = parse_value(key, value)?,
            "promoterelax" => self.promoterelax = parse_bool(key, value)?,
            "demoterelax" => self.demoterelax = parse_bool(key, value)?,
            "promotejump" => self.promotejump = parse_bool(key, value)?,
            "lookout_prob" => self.lookout_prob = parse_value(key, value)?,
            "seed" => self.seed = parse_value(key, value)?,
            "logsize" => self.logsize = parse_value(key, value)?,
            "eprob_min" => self.eprob_min = parse_value(key, value)?,
            "eprob_max" => self.eprob_max = parse_value(key, value)?,
            "bustprob" => self.bustprob = parse_value(key, value)?,
            "dist_trials" => self.dist_trials = parse_value(key, value)?,
            "tri_trials" => self.tri_trials = parse_value(key, value)?,
            "pyr_trials" => self.pyr_trials = parse_value(key, value)?,
            "ligasize" => self.ligasize = parse_value(key, value)?,
            "ndim" => self.ndim = parse_value(key, value)?,
            "maxcputime" => self.maxcputime = parse_value(key, value)?,
            "crystal" => self.crystal = parse_bool(key, value)?,
            "latpar" => self.latpar = parse_latpar(value)?,
            "rmax" => self.rmax = parse_value(key, value)?,
            "natoms" => self.natoms = Some(parse_value(key, value)?),
            other => {
                return Err(CliError::ParseArgs(format!("unknown parameter '{other}'")));
            }
        }
        Ok(())
    }

    pub fn to_search_config(&self) -> SearchConfig {
        let fit = FitParams {
            tol_dd: self.tol_dd,
            tol_nbad: self.tol_nbad,
            penalty: self.penalty,
            promotefrac: self.promotefrac,
            promotejump: self.promotejump,
            promoterelax: self.promoterelax,
            demoterelax: self.demoterelax,
            lookout_prob: self.lookout_prob,
            filters: Vec::new(),
        };
        let liga = LigaParams {
            ligasize: self.ligasize,
            ndim: self.ndim,
            tol_bad: self.tol_bad,
            logsize: self.logsize,
            eprob_min: self.eprob_min,
            eprob_max: self.eprob_max,
            bustprob: self.bustprob,
            dist_trials: self.dist_trials,
            tri_trials: self.tri_trials,
            pyr_trials: self.pyr_trials,
            maxcputime: self.maxcputime,
            seed: self.seed,
        };
        let mode = if self.crystal {
            StructureMode::Crystal {
                latpar: self.latpar,
                rmax: self.rmax,
            }
        } else {
            StructureMode::Molecule
        };
        SearchConfig {
            fit,
            liga,
            mode,
            natoms: self.natoms,
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::ParseArgs(format!("invalid value '{value}' for parameter '{key}'")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(CliError::ParseArgs(format!(
            "invalid boolean '{other}' for parameter '{key}'"
        ))),
    }
}

fn parse_latpar(value: &str) -> Result<[f64; 6]> {
    let numbers: Vec<f64> = value
        .split(',')
        .map(|tok| parse_value("latpar", tok.trim()))
        .collect::<Result<_>>()?;
    parse_latpar_values(&numbers)
}

fn parse_latpar_values(values: &[f64]) -> Result<[f64; 6]> {
    <[f64; 6]>::try_from(values).map_err(|_| {
        CliError::ParseArgs(format!(
            "latpar needs 6 values (a, b, c, alpha, beta, gamma), got {}",
            values.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_engine() {
        let params = RunParams::default();
        assert_eq!(params.tol_dd, 0.1);
        assert_eq!(params.tol_bad, 1.0e-4);
        assert_eq!(params.dist_trials, 10);
        assert_eq!(params.tri_trials, 20);
        assert_eq!(params.pyr_trials, 1000);
        assert_eq!(params.outfmt, StructureFormat::RawXyz);
        assert!(!params.crystal);
    }

    #[test]
    fn overrides_parse_typed_values() {
        let mut params = RunParams::default();
        params.apply_override("tol_bad", "1e-6").unwrap();
        params.apply_override("seed", "7").unwrap();
        params.apply_override("penalty", "fabs").unwrap();
        params.apply_override("promotejump", "false").unwrap();
        params.apply_override("outfmt", "atomeye").unwrap();
        params
            .apply_override("latpar", "2.0, 2.0, 2.0, 90, 90, 90")
            .unwrap();
        assert_eq!(params.tol_bad, 1e-6);
        assert_eq!(params.seed, 7);
        assert_eq!(params.penalty, PenaltyKind::Fabs);
        assert!(!params.promotejump);
        assert_eq!(params.outfmt, StructureFormat::AtomEye);
        assert_eq!(params.latpar[0], 2.0);
    }

    #[test]
    fn unknown_and_malformed_overrides_fail() {
        let mut params = RunParams::default();
        assert!(params.apply_override("no_such_key", "1").is_err());
        assert!(params.apply_override("tol_bad", "abc").is_err());
        assert!(params.apply_override("crystal", "maybe").is_err());
        assert!(params.apply_override("latpar", "1,2,3").is_err());
    }

    #[test]
    fn parfile_values_merge_under_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(
            &path,
            "tol_bad = 1e-7\nseed = 11\npenalty = \"well\"\ncrystal = true\nlatpar = [3.0, 3.0, 3.0, 90.0, 90.0, 90.0]\nnatoms = 2\n",
        )
        .unwrap();
        let mut params = RunParams::default();
        params.apply_parfile(&path).unwrap();
        assert_eq!(params.tol_bad, 1e-7);
        assert_eq!(params.seed, 11);
        assert_eq!(params.penalty, PenaltyKind::Well);
        assert!(params.crystal);
        assert_eq!(params.natoms, Some(2));
        // command-line overrides win
        params.apply_override("seed", "99").unwrap();
        assert_eq!(params.seed, 99);
    }

    #[test]
    fn evolve_frac_is_a_promotefrac_alias() {
        let mut params = RunParams::default();
        params.apply_override("evolve_frac", "0.3").unwrap();
        assert_eq!(params.promotefrac, 0.3);
    }

    #[test]
    fn unknown_parfile_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "no_such_key = 1\n").unwrap();
        let mut params = RunParams::default();
        assert!(matches!(
            params.apply_parfile(&path),
            Err(CliError::ParFile { .. })
        ));
    }

    #[test]
    fn search_config_reflects_crystal_mode() {
        let mut params = RunParams::default();
        params.apply_override("crystal", "true").unwrap();
        params.apply_override("rmax", "2.5").unwrap();
        params.apply_override("natoms", "4").unwrap();
        let config = params.to_search_config();
        assert!(matches!(
            config.mode,
            StructureMode::Crystal { rmax, .. } if rmax == 2.5
        ));
        assert_eq!(config.natoms, Some(4));
    }
}
