use std::path::PathBuf;

use nerfeed_core::NerFeedError;
use thiserror::Error;

/// Errors raised while reading pretrained vector files.
#[derive(Debug, Error)]
pub enum VectorError {
    #[error("vector file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The `count dim` header line is missing or unreadable.
    #[error("bad header in {path}: {line:?}")]
    BadHeader { path: String, line: String },

    /// A binary record ended before its vector was complete.
    #[error("truncated record for word {word:?} in {path}")]
    Truncated { path: String, word: String },

    #[error("vector for {word:?} has {found} values, expected {expected}")]
    DimensionMismatch {
        word: String,
        expected: usize,
        found: usize,
    },

    #[error("vector file {0} holds no vectors")]
    Empty(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<VectorError> for NerFeedError {
    fn from(err: VectorError) -> Self {
        NerFeedError::Vectors(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VectorError>;
