//! Harness error types.

use std::path::PathBuf;

use textbench_core::CorpusError;
use thiserror::Error;

/// Errors that stop a harness run or a single backend.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A contract call failed in a way the battery cannot record and skip.
    #[error("corpus error: {0}")]
    Corpus(#[from] CorpusError),

    /// A corpus input file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Input {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A corpus input file is not a valid annotated document.
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Report serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error while writing reports.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result alias for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;
