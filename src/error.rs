use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the storage layer, the engine driver and the decomposition pipeline.
///
/// Every variant is fatal for the task tree that produced it: the engine never retries and
/// never degrades to a partial result.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A required file could not be opened, created, resized or mapped.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A binary file does not match the layout its description promises.
    #[error("malformed file {path}: {reason}")]
    Format { path: PathBuf, reason: String },

    /// A graph description or engine configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An algorithm's `finalize` detected a globally inconsistent result.
    #[error("algorithm {algorithm} failed: {reason}")]
    Algorithm { algorithm: &'static str, reason: String },

    /// The worker pool could not be created.
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Description or manifest (de)serialization failed.
    #[error("serialization error on {path}: {reason}")]
    Serde { path: PathBuf, reason: String },
}

impl EngineError {
    /// Wraps an `io::Error` together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        EngineError::Io { path: path.into(), source }
    }

    pub fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        EngineError::Format { path: path.into(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
