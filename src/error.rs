// ============================================================
// Error taxonomy
// ============================================================
// Every fallible operation in the core returns `Result<T>` over
// `AutoencoderError`. The CLI and use-case layers wrap these in
// `anyhow` with extra context before they reach the user.
//
// Fatal before training:  Configuration
// Fatal at load time:     DataFormat, CheckpointMismatch
// Surfaced, never healed: Cache

use std::path::PathBuf;

use thiserror::Error;

/// Convenient result type used throughout the crate.
pub type Result<T, E = AutoencoderError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum AutoencoderError {
    /// Invalid or inconsistent hyperparameters, or a missing required file.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A malformed row in a vocabulary or embedding file.
    #[error("data format error in {path:?} line {line}: {message}")]
    DataFormat {
        path:    PathBuf,
        line:    usize,
        message: String,
    },

    /// A checkpoint was produced under a different architecture or vocabulary.
    #[error("checkpoint mismatch on {field}: checkpoint has {checkpoint}, environment supplies {supplied}")]
    CheckpointMismatch {
        field:      &'static str,
        checkpoint: String,
        supplied:   String,
    },

    /// Unreadable or corrupted cache entry. Clear the split to recover.
    #[error("cache error at {path:?}: {message}")]
    Cache {
        path:    PathBuf,
        message: String,
    },

    /// Recorder failure while writing or reading model weights.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("io error while processing {path:?}: {source}")]
    Io {
        source: std::io::Error,
        path:   Option<PathBuf>,
    },

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl AutoencoderError {
    /// Attach the offending path to an IO error.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io { source, path: Some(path.into()) }
    }

    pub fn data_format(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::DataFormat { path: path.into(), line, message: message.into() }
    }

    pub fn mismatch(field: &'static str, checkpoint: impl ToString, supplied: impl ToString) -> Self {
        Self::CheckpointMismatch {
            field,
            checkpoint: checkpoint.to_string(),
            supplied:   supplied.to_string(),
        }
    }
}

impl From<std::io::Error> for AutoencoderError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { source, path: None }
    }
}

impl From<serde_json::Error> for AutoencoderError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<tokenizers::Error> for AutoencoderError {
    fn from(err: tokenizers::Error) -> Self {
        Self::Tokenizer(err.to_string())
    }
}
