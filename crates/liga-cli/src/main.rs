mod cli;
mod config;
mod error;
mod logging;
mod output;

use crate::cli::Cli;
use crate::config::RunParams;
use crate::error::{CliError, Result};
use crate::output::OutputWriter;
use clap::Parser;
use liga_core::core::io::{distances, xyz};
use liga_core::engine::progress::ProgressReporter;
use liga_core::workflows::solve;
use std::cell::RefCell;
use std::process::ExitCode;
use tracing::{error, info};

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.as_deref()) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        // time budget ran out before a solution
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<bool> {
    let (distfile_arg, overrides) = cli.split_args()?;
    let mut params = RunParams::default();
    if let Some(parfile) = &cli.parfile {
        params.apply_parfile(parfile)?;
    }
    if let Some(distfile) = distfile_arg {
        params.distfile = Some(distfile);
    }
    for (key, value) in &overrides {
        params.apply_override(key, value)?;
    }
    let Some(distfile) = params.distfile.clone() else {
        return Err(CliError::ParseArgs("distance file not defined".into()));
    };

    let target = distances::read_distance_file(&distfile)?;
    info!(
        distfile = %distfile.display(),
        distances = target.len(),
        crystal = params.crystal,
        "target distance table loaded"
    );
    let initial = params
        .inistru
        .as_deref()
        .map(xyz::read_xyz_file)
        .transpose()?;

    let config = params.to_search_config();
    let writer = RefCell::new(OutputWriter::new(&params));
    let reporter =
        ProgressReporter::with_callback(Box::new(|event| writer.borrow_mut().on_progress(&event)));
    let solution = solve::run(&target, initial.as_deref(), &config, &reporter)?;

    if let Some(structure) = &solution.structure {
        if let Some(outstru) = &params.outstru {
            structure.write_file(outstru, params.outfmt)?;
            info!(path = %outstru.display(), "best structure written");
        }
    }
    if solution.solved {
        println!("Solution found!!!");
    } else {
        info!(
            iterations = solution.iterations,
            "stopped without reaching the target badness"
        );
    }
    Ok(solution.solved)
}
