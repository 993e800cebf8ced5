use crate::error::{CliError, Result};
use clap::Parser;
use std::path::PathBuf;

const AUTHORS: &str = "Pavol Juhas, Simon J. L. Billinge";
const ABOUT: &str = "liga - reconstruction of a 3-D atomic structure from its unordered set of \
interatomic pair distances, by a competitive tournament of partial structures.";
const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = AUTHORS,
    version,
    about = ABOUT,
    help_template = HELP_TEMPLATE,
)]
pub struct Cli {
    /// Target distance file, plus any parameter overrides as key=value
    /// pairs (overrides win over the parameter file).
    #[arg(value_name = "DISTFILE|KEY=VALUE")]
    pub args: Vec<String>,

    /// Read run parameters from a TOML file.
    #[arg(short = 'p', long, value_name = "FILE")]
    pub parfile: Option<PathBuf>,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Separate the positional arguments into the distance file and the
    /// `key=value` parameter overrides.
    pub fn split_args(&self) -> Result<(Option<PathBuf>, Vec<(String, String)>)> {
        let mut distfile = None;
        let mut overrides = Vec::new();
        for arg in &self.args {
            if let Some((key, value)) = arg.split_once('=') {
                if key.is_empty() {
                    return Err(CliError::ParseArgs(format!(
                        "missing parameter name in '{arg}'"
                    )));
                }
                overrides.push((key.to_string(), value.to_string()));
            } else if distfile.is_none() {
                distfile = Some(PathBuf::from(arg));
            } else {
                return Err(CliError::ParseArgs(format!(
                    "unexpected extra argument '{arg}'"
                )));
            }
        }
        Ok((distfile, overrides))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli_parsing() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn distfile_and_overrides_are_separated() {
        let cli = Cli::parse_from([
            "liga",
            "target.dst",
            "tol_bad=1e-5",
            "seed=42",
            "-p",
            "run.toml",
        ]);
        assert_eq!(cli.parfile, Some(PathBuf::from("run.toml")));
        let (distfile, overrides) = cli.split_args().unwrap();
        assert_eq!(distfile, Some(PathBuf::from("target.dst")));
        assert_eq!(
            overrides,
            vec![
                ("tol_bad".to_string(), "1e-5".to_string()),
                ("seed".to_string(), "42".to_string()),
            ]
        );
    }

    #[test]
    fn second_bare_argument_is_rejected() {
        let cli = Cli::parse_from(["liga", "one.dst", "two.dst"]);
        assert!(cli.split_args().is_err());
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["liga", "-q", "-v"]).is_err());
    }
}
