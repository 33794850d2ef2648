//! Error type for API misuse.
//!
//! Numerical trouble (non-converging solves, out-of-range samples, NaN) is
//! handled locally by clamping or substitution and never shows up here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FluidError {
    #[error("grid dimension {0} is not of the form 2^k + 2")]
    InvalidDimension(usize),

    #[error("buffer holds {actual} cells, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("multigrid recursion exceeded {0} levels")]
    LevelOverrun(usize),

    #[error("a chunk already exists at {0:?}")]
    DuplicateChunk([i32; 3]),

    #[error("no chunk at index {0}")]
    UnknownChunk(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FluidError>;
