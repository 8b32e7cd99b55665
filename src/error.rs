//! Error types for the tree engine

use thiserror::Error;
use tracing::warn;

pub type Result<T> = std::result::Result<T, TreeError>;

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Duplicate key")]
    DuplicateKey,

    #[error("Payload size mismatch: expected {expected} bytes, got {actual}")]
    PayloadSize { expected: usize, actual: usize },

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Data corruption: {0}")]
    Corruption(String),

    #[error("Corrupted file: {0}")]
    CorruptedFile(std::path::PathBuf),
}

impl From<bincode::Error> for TreeError {
    fn from(err: bincode::Error) -> Self {
        TreeError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for TreeError {
    fn from(err: serde_json::Error) -> Self {
        TreeError::Serialization(err.to_string())
    }
}

impl TreeError {
    /// `Corruption` with a warning logged first
    pub(crate) fn corruption(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!(%reason, "corrupted tree data");
        TreeError::Corruption(reason)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::capture_warnings;
    use super::*;

    #[test]
    fn test_corruption_logs_warning() {
        let mut err = None;
        let logged = capture_warnings(|| err = Some(TreeError::corruption("node 7 is linked twice")));

        assert!(matches!(err, Some(TreeError::Corruption(ref reason)) if reason == "node 7 is linked twice"));
        assert!(logged.contains("WARN"));
        assert!(logged.contains("node 7 is linked twice"));
    }
}
