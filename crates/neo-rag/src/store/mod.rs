pub mod neostore;
pub(crate) mod persist;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::embeddings::EmbeddingModel;
use crate::error::{RagError, Result};
use crate::types::{Chunk, SearchHit, SimilarityMetric};

pub use neostore::NeoStore;
pub use persist::{resolve_store_path, DEFAULT_STORE_FILE, STORE_EXTENSION};

/// Capability shared by every similarity index the query side can talk to.
pub trait VectorStore: Send + Sync {
    fn backend(&self) -> StoreBackend;

    /// Index `chunks`, replacing any previous contents. Returns the row count.
    fn build(&mut self, chunks: Vec<Chunk>) -> Result<usize>;

    fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>>;

    fn persist(&self, path: &Path) -> Result<PathBuf>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Neo,
}

impl StoreBackend {
    pub fn create(
        self,
        embedder: Arc<dyn EmbeddingModel>,
        metric: SimilarityMetric,
    ) -> Box<dyn VectorStore> {
        match self {
            StoreBackend::Neo => Box::new(NeoStore::new(embedder, metric)),
        }
    }

    pub fn open(
        self,
        path: &Path,
        embedder: Arc<dyn EmbeddingModel>,
        metric: SimilarityMetric,
    ) -> Result<Box<dyn VectorStore>> {
        match self {
            StoreBackend::Neo => Ok(Box::new(NeoStore::load_embeddings(path, embedder, metric)?)),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Neo => write!(f, "neo"),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "neo" | "neostore" => Ok(StoreBackend::Neo),
            other => Err(RagError::InvalidArgument(format!(
                "unknown vector store backend '{}'",
                other
            ))),
        }
    }
}
