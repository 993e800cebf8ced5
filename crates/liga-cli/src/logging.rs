use crate::error::Result;
use std::fs::File;
use std::path::Path;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*};

/// Map the `-v` count to a level; `--quiet` silences everything.
fn level_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::OFF;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Install the global subscriber for a run.
///
/// The console shows compact lines stamped with elapsed wall time, so the
/// per-iteration records from the scheduler read directly against the
/// `maxcputime` budget.  An optional log file keeps the full records with
/// their source targets for post-run analysis.
pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(fmt::time::uptime())
        .with_target(false)
        .compact();
    let registry = tracing_subscriber::registry()
        .with(level_filter(verbosity, quiet))
        .with(console);
    match log_file {
        Some(path) => {
            let file = File::create(path)?;
            let file_layer = fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_timer(fmt::time::uptime())
                .with_target(true);
            registry.with(file_layer).init();
        }
        None => registry.init(),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use tracing::info;

    #[test]
    fn verbosity_maps_to_levels_and_quiet_wins() {
        assert_eq!(level_filter(0, false), LevelFilter::WARN);
        assert_eq!(level_filter(1, false), LevelFilter::INFO);
        assert_eq!(level_filter(2, false), LevelFilter::DEBUG);
        assert_eq!(level_filter(5, false), LevelFilter::TRACE);
        assert_eq!(level_filter(3, true), LevelFilter::OFF);
    }

    #[test]
    fn file_layer_records_iteration_fields() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("run.log");

        let file = File::create(&log_path).unwrap();
        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true);
        let subscriber = tracing_subscriber::registry().with(file_layer);

        tracing::subscriber::with_default(subscriber, || {
            info!(iteration = 12, nbad = 0.25, "iteration logged to file");
        });

        let content = std::fs::read_to_string(&log_path).unwrap();
        assert!(content.contains("iteration logged to file"));
        assert!(content.contains("iteration=12"));
        assert!(content.contains("INFO"));
    }

    #[test]
    fn invalid_log_file_path_propagates_error() {
        let invalid_path = Path::new("/");
        if invalid_path.is_dir() {
            let result = setup_logging(0, false, Some(invalid_path));
            assert!(matches!(result, Err(CliError::Io(_))));
        }
    }
}
