//! Error types for quarry-index.

use std::num::TryFromIntError;

/// Errors that can occur during indexing and retrieval.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// IO error reading source files or persisting state.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Embedding provider error.
    #[error("embedding error: {0}")]
    Embed(#[from] quarry_embed::EmbedError),

    /// Vector store error.
    #[error("store error: {0}")]
    Store(#[from] quarry_store::StoreError),

    /// Tree-sitter parsing error.
    #[error("parse failed: {0}")]
    Parse(String),

    /// Root scan failure (unreadable root, walker error).
    #[error("scan failed: {0}")]
    Scan(String),

    /// The run was cancelled cooperatively.
    #[error("cancelled")]
    Cancelled,

    /// Integer conversion error.
    #[error("integer conversion failed: {0}")]
    IntConversion(#[from] TryFromIntError),

    /// Generic catch-all error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
