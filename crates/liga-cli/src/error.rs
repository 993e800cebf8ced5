use liga_core::engine::error::LigaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("argument error: {0}")]
    ParseArgs(String),

    #[error("parameter file '{path}': {message}")]
    ParFile { path: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Liga(#[from] LigaError),
}

impl From<liga_core::core::io::IoError> for CliError {
    fn from(source: liga_core::core::io::IoError) -> Self {
        CliError::Liga(LigaError::Io(source))
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
