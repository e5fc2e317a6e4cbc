pub mod hashing;
#[cfg(feature = "onnx")]
pub mod minilm;

use std::sync::Arc;

use indicatif::ProgressBar;
use ndarray::Array2;

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use crate::error::{RagError, Result};

pub use hashing::HashingEmbedder;

/// Unified embedding model trait
pub trait EmbeddingModel: Send + Sync {
    /// Embed a search query
    fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// Embed a document chunk
    fn embed_document(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// Batch embed documents for ingestion
    fn embed_documents(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_document(t)).collect()
    }

    /// Embedding vector dimension
    fn dimension(&self) -> usize;

    /// Identifier persisted alongside stored vectors.
    fn name(&self) -> &str;
}

/// Encode `texts` into an `[len × dimension]` matrix, `batch_size` rows at a time.
///
/// The optional progress bar is advanced by the number of rows in each batch.
pub fn encode(
    model: &dyn EmbeddingModel,
    texts: &[&str],
    batch_size: usize,
    progress: Option<&ProgressBar>,
) -> Result<Array2<f32>> {
    if batch_size == 0 {
        return Err(RagError::InvalidArgument("batch_size must be > 0".into()));
    }
    let dimension = model.dimension();
    let mut flat = Vec::with_capacity(texts.len() * dimension);

    for batch in texts.chunks(batch_size) {
        let rows = model.embed_documents(batch).map_err(RagError::Embedding)?;
        if rows.len() != batch.len() {
            return Err(RagError::Embedding(anyhow::anyhow!(
                "model returned {} vectors for {} inputs",
                rows.len(),
                batch.len()
            )));
        }
        for row in rows {
            check_dimension(dimension, row.len())?;
            flat.extend_from_slice(&row);
        }
        if let Some(pb) = progress {
            pb.inc(batch.len() as u64);
        }
    }

    Array2::from_shape_vec((texts.len(), dimension), flat)
        .map_err(|e| RagError::Embedding(anyhow::anyhow!("embedding matrix shape: {}", e)))
}

/// Embed one query, checking its dimension.
pub fn encode_query(model: &dyn EmbeddingModel, query: &str) -> Result<Vec<f32>> {
    let vector = model.embed_query(query).map_err(RagError::Embedding)?;
    check_dimension(model.dimension(), vector.len())?;
    Ok(vector)
}

fn check_dimension(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(RagError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// Build the embedder selected in config.
pub fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingModel>> {
    match config.backend {
        EmbeddingBackend::Hashing => Ok(Arc::new(HashingEmbedder::new(config.dimension))),
        #[cfg(feature = "onnx")]
        EmbeddingBackend::MiniLm => {
            let model = minilm::MiniLmEmbeddings::from_model_dir(&config.model_dir)
                .map_err(RagError::Embedding)?;
            Ok(Arc::new(model))
        }
        #[cfg(not(feature = "onnx"))]
        EmbeddingBackend::MiniLm => Err(RagError::MissingDependency {
            capability: "ONNX sentence embeddings",
            hint: "rebuild with `--features onnx`",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ShortModel;

    impl EmbeddingModel for ShortModel {
        fn embed_query(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(vec![1.0])
        }
        fn embed_document(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(vec![1.0])
        }
        fn dimension(&self) -> usize {
            3
        }
        fn name(&self) -> &str {
            "short"
        }
    }

    #[test]
    fn test_encode_shapes_matrix_across_batches() {
        let model = HashingEmbedder::new(16);
        let texts = ["a b", "c d", "e f", "g h", "i j"];
        let pb = ProgressBar::hidden();
        let matrix = encode(&model, &texts, 2, Some(&pb)).unwrap();
        assert_eq!(matrix.dim(), (5, 16));
        assert_eq!(pb.position(), 5);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let model = HashingEmbedder::default();
        let texts = ["Paris is the capital of France", "Rust ownership rules"];
        let a = encode(&model, &texts, 32, None).unwrap();
        let b = encode(&model, &texts, 1, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let err = encode(&ShortModel, &["x"], 4, None).unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 3, actual: 1 }));
        assert!(encode_query(&ShortModel, "x").is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(encode(&HashingEmbedder::default(), &["x"], 0, None).is_err());
    }

    #[test]
    fn test_empty_input_gives_empty_matrix() {
        let matrix = encode(&HashingEmbedder::new(8), &[], 4, None).unwrap();
        assert_eq!(matrix.dim(), (0, 8));
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_minilm_requires_onnx_feature() {
        let config = EmbeddingConfig {
            backend: EmbeddingBackend::MiniLm,
            ..Default::default()
        };
        assert!(matches!(from_config(&config), Err(RagError::MissingDependency { .. })));
    }
}
