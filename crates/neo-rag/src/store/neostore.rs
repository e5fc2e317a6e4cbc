//! NeoStore: exhaustive in-memory similarity index over chunk embeddings.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{Array2, ArrayView1};

use super::persist::{self, StoreFile};
use super::{StoreBackend, VectorStore};
use crate::embeddings::{self, EmbeddingModel};
use crate::error::{RagError, Result};
use crate::progress;
use crate::types::{Chunk, SearchHit, SimilarityMetric};

pub const DEFAULT_BATCH_SIZE: usize = 32;

pub struct NeoStore {
    embedder: Arc<dyn EmbeddingModel>,
    metric: SimilarityMetric,
    batch_size: usize,
    show_progress: bool,
    /// `vectors.row(i)` embeds `chunks[i]`.
    vectors: Option<Array2<f32>>,
    chunks: Vec<Chunk>,
}

impl NeoStore {
    pub fn new(embedder: Arc<dyn EmbeddingModel>, metric: SimilarityMetric) -> Self {
        Self {
            embedder,
            metric,
            batch_size: DEFAULT_BATCH_SIZE,
            show_progress: false,
            vectors: None,
            chunks: Vec::new(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn vectors(&self) -> Option<&Array2<f32>> {
        self.vectors.as_ref()
    }

    pub fn is_built(&self) -> bool {
        self.vectors.is_some()
    }

    /// Encode every chunk in batches and keep the matrix alongside the chunk list.
    /// With `persist`, the result is also written to `path` (see [`Self::save_embeddings`]).
    pub fn build_store(
        &mut self,
        chunks: Vec<Chunk>,
        batch_size: usize,
        persist: bool,
        path: &Path,
    ) -> Result<&Array2<f32>> {
        if chunks.is_empty() {
            return Err(RagError::InvalidArgument("no chunks to index".into()));
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let pb = progress::bar(texts.len() as u64, self.show_progress, "chunks");
        let started = std::time::Instant::now();
        let vectors = embeddings::encode(self.embedder.as_ref(), &texts, batch_size, Some(&pb))?;
        pb.finish_and_clear();

        tracing::info!(
            chunks = chunks.len(),
            dimension = vectors.ncols(),
            model = self.embedder.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "vector store built"
        );

        self.vectors = Some(vectors);
        self.chunks = chunks;

        if persist {
            self.save_embeddings(path)?;
        }
        self.vectors.as_ref().ok_or(RagError::EmptyStore)
    }

    /// Write matrix and chunks to one file; returns the resolved file path.
    pub fn save_embeddings(&self, path: &Path) -> Result<PathBuf> {
        let vectors = self.vectors.as_ref().ok_or(RagError::EmptyStore)?;
        let target = persist::resolve_store_path(path);
        let file = StoreFile::from_parts(self.embedder.name(), vectors, &self.chunks)?;
        persist::write_store_file(&target, &file)?;

        tracing::info!(path = %target.display(), rows = vectors.nrows(), "vector store saved");
        Ok(target)
    }

    /// Restore a store written by [`Self::save_embeddings`], bound to `embedder` and `metric`.
    pub fn load_embeddings(
        path: &Path,
        embedder: Arc<dyn EmbeddingModel>,
        metric: SimilarityMetric,
    ) -> Result<Self> {
        let target = persist::resolve_store_path(path);
        let file = persist::read_store_file(&target)?;
        let model = file.model.clone();
        let (vectors, chunks) = file.into_parts(&target)?;

        if vectors.ncols() != embedder.dimension() {
            return Err(RagError::corrupt(
                &target,
                format!(
                    "stored dimension {} does not match embedder dimension {}",
                    vectors.ncols(),
                    embedder.dimension()
                ),
            ));
        }
        if model != embedder.name() {
            tracing::warn!(
                stored = %model,
                current = embedder.name(),
                "store was built with a different embedding model"
            );
        }

        tracing::info!(
            path = %target.display(),
            rows = chunks.len(),
            %metric,
            "vector store loaded"
        );
        Ok(Self {
            vectors: Some(vectors),
            chunks,
            ..Self::new(embedder, metric)
        })
    }

    /// Top-`k` chunks for `query` under the store's metric.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(RagError::InvalidArgument("k must be >= 1".into()));
        }
        if self.vectors.is_none() {
            return Err(RagError::EmptyStore);
        }
        let query_vector = embeddings::encode_query(self.embedder.as_ref(), query)?;
        self.search_by_vector(&query_vector, k)
    }

    pub fn search_by_vector(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(RagError::InvalidArgument("k must be >= 1".into()));
        }
        let vectors = self.vectors.as_ref().ok_or(RagError::EmptyStore)?;
        if query.len() != vectors.ncols() {
            return Err(RagError::DimensionMismatch {
                expected: vectors.ncols(),
                actual: query.len(),
            });
        }

        let scores = score_all(vectors, ArrayView1::from(query), self.metric);
        let available = scores.len();
        if k > available {
            tracing::warn!(
                requested = k,
                available,
                "fewer chunks in store than requested, returning all"
            );
        }

        Ok(rank(&scores, self.metric)
            .into_iter()
            .take(k)
            .map(|i| SearchHit {
                chunk: self.chunks[i].clone(),
                score: scores[i],
            })
            .collect())
    }
}

/// Score every stored row against `query`.
pub fn score_all(
    vectors: &Array2<f32>,
    query: ArrayView1<f32>,
    metric: SimilarityMetric,
) -> Vec<f32> {
    match metric {
        SimilarityMetric::Cosine => {
            let query_norm = query.dot(&query).sqrt();
            let dots = vectors.dot(&query);
            vectors
                .outer_iter()
                .zip(dots.iter())
                .map(|(row, dot)| {
                    let denom = row.dot(&row).sqrt() * query_norm;
                    if denom > 0.0 {
                        dot / denom
                    } else {
                        0.0
                    }
                })
                .collect()
        }
        SimilarityMetric::Euclidean => vectors
            .outer_iter()
            .map(|row| {
                row.iter()
                    .zip(query.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f32>()
                    .sqrt()
            })
            .collect(),
    }
}

/// Row indices best-first; the sort is stable so ties keep insertion order.
pub fn rank(scores: &[f32], metric: SimilarityMetric) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    if metric.higher_is_better() {
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    } else {
        order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));
    }
    order
}

impl VectorStore for NeoStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Neo
    }

    fn build(&mut self, chunks: Vec<Chunk>) -> Result<usize> {
        let batch_size = self.batch_size;
        let rows = self.build_store(chunks, batch_size, false, Path::new(""))?.nrows();
        Ok(rows)
    }

    fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        NeoStore::search(self, query, k)
    }

    fn persist(&self, path: &Path) -> Result<PathBuf> {
        self.save_embeddings(path)
    }

    fn len(&self) -> usize {
        self.chunks.len()
    }
}
