use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the spectral analysis engine.
#[derive(Debug, Error)]
pub enum SplatError {
    #[error("{what}: expected {expected} values but got {got}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("spectrum '{0}' contains no data")]
    EmptySpectrum(String),

    #[error("no ranges have been selected")]
    NoRanges,

    #[error("line {line} contains no valid data")]
    NoValidData { line: usize },

    #[error("singular matrix while fitting")]
    SingularMatrix,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("index {index} is out of bounds for a spectrum of {len} values")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("{path}: line {line}: {message}")]
    RangesFile {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SplatError>;
