use crate::core::io::IoError;
use crate::core::models::distance_table::DistanceTableError;
use crate::core::models::lattice::LatticeError;
use crate::engine::utils::sampling::SamplingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LigaError {
    #[error("invalid distance table: {0}")]
    InvalidDistanceTable(#[from] DistanceTableError),

    #[error("invalid lattice: {0}")]
    InvalidLattice(#[from] LatticeError),

    #[error("invalid structure: {0}")]
    InvalidStructure(String),

    #[error("atom index {index} out of range for {len} atoms")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("sampling failed: {0}")]
    Sampling(#[from] SamplingError),

    #[error(transparent)]
    Io(#[from] IoError),
}

pub type Result<T> = std::result::Result<T, LigaError>;
