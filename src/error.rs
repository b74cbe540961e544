use thiserror::Error;

/// Error taxonomy for the indexing and retrieval engine.
///
/// Config errors are raised before any file is opened. Format errors carry the
/// offending byte offset so a caller can inspect the file directly. Query errors
/// are reserved for malformed query syntax; an empty query or an unknown term is
/// not an error (see `Ranker::order` and `InvertedIndex::search`).
#[derive(Debug, Error)]
pub enum IrError {
    #[error("config error: {0}")]
    Config(String),

    #[error("format error at byte {offset}: {message}")]
    Format { offset: u64, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("query error: {0}")]
    Query(String),
}

pub type Result<T> = std::result::Result<T, IrError>;
