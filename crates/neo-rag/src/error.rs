use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the ingestion, store and query layers.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("unsupported document type '{extension}': {}", .path.display())]
    UnsupportedDocumentType { path: PathBuf, extension: String },

    #[error("missing dependency for {capability}: {hint}")]
    MissingDependency {
        capability: &'static str,
        hint: &'static str,
    },

    #[error("vector store is empty; run the build step first")]
    EmptyStore,

    #[error("corrupt store file {}: {reason}", .path.display())]
    CorruptStore { path: PathBuf, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{succeeded} documents loaded, {failed} failed, see log")]
    PartialIngestionFailure { succeeded: usize, failed: usize },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("failed to load {}: {reason}", .path.display())]
    Load { path: PathBuf, reason: String },

    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("loader panicked on {}: {message}", .path.display())]
    LoaderPanicked { path: PathBuf, message: String },

    #[error("invalid config: {0}")]
    Config(String),

    #[error("embedding failed: {0}")]
    Embedding(#[source] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RagError {
    pub(crate) fn load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Load {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptStore {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that invalidate a whole store rather than one item.
    pub fn is_store_integrity(&self) -> bool {
        matches!(self, Self::EmptyStore | Self::CorruptStore { .. })
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
