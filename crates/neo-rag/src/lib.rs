pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod llm;
pub mod loaders;
pub mod pipeline;
mod progress;
pub mod rag;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export primary types for convenience
pub use chunker::TextChunker;
pub use config::RagConfig;
pub use embeddings::{EmbeddingModel, HashingEmbedder};
pub use error::{RagError, Result};
pub use llm::{Generator, TokenStream};
pub use loaders::{LoaderKind, LoaderRegistry};
pub use pipeline::{IngestionPipeline, IngestionReport};
pub use rag::{Answer, BudgetTracker, QueryEngine};
pub use store::{NeoStore, StoreBackend, VectorStore};
pub use types::{Chunk, Document, SearchHit, SimilarityMetric};
