#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("embedding error: {0}")]
    Embed(#[from] quarry_embed::EmbedError),

    #[error("malformed dataset: {0}")]
    Format(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, BenchError>;
