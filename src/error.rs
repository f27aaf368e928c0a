/*
Errors raised by the analysis core.

Format, range and fit failures are all recoverable at the request boundary:
the caller may fix the input and retry without throwing the session away.
Cancellation is not represented here, see `cancel::Outcome`.
 */

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MsdError {
    #[error("malformed trajectory at line {line}: {message}")]
    Format { line: usize, message: String },

    #[error("invalid time range: {0}")]
    Range(String),

    #[error("diffusion fit failed: {0}")]
    Fit(String),

    #[error("trajectory has already been unwrapped")]
    AlreadyUnwrapped,

    #[error("trajectory is only partially unwrapped; reload it before computing the MSD")]
    InconsistentTrajectory,

    #[error("no trajectory loaded")]
    NoTrajectory,

    #[error("no MSD curve available; compute the MSD first")]
    NoCurve,

    #[error("I/O error on `{path}`: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("MSD export error: {0}")]
    Export(#[from] csv::Error),

    #[error("report serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MsdError {
    pub(crate) fn format(line: usize, message: impl Into<String>) -> Self {
        MsdError::Format {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MsdError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, MsdError>;
