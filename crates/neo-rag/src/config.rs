use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RagError, Result};
use crate::types::SimilarityMetric;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub data_dir: PathBuf,
    pub source_dir: PathBuf,
    pub store_path: PathBuf,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub ingestion: IngestionConfig,
    pub search: SearchConfig,
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Deterministic feature hashing, no model files needed.
    Hashing,
    /// Sentence-transformer MiniLM via ONNX Runtime (`onnx` feature).
    MiniLm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub model_dir: PathBuf,
    pub dimension: usize,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap_ratio: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub threads: usize,
    pub url_timeout_secs: u64,
    /// File names routed to the URL-list loader instead of the text loader.
    pub reserved_file_names: Vec<String>,
    /// Maximum nesting for archives inside archives.
    pub archive_depth: usize,
    pub show_progress: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_k: usize,
    pub metric: SimilarityMetric,
    pub max_context_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model_name: String,
    /// System instruction placed ahead of the retrieved context.
    pub persona: String,
    /// Number of past question/answer turns replayed into the prompt.
    pub history_window: usize,
    pub cost_per_1k_tokens: f64,
}

pub const DEFAULT_PERSONA: &str = "You are a helpful assistant. Use the provided context to answer the \
user's question. Read the context before answering and think step by step. If the context does not \
contain the answer, say so instead of guessing.";

impl RagConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 {
            return Err(RagError::Config("embedding.dimension must be > 0".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(RagError::Config("embedding.batch_size must be > 0".into()));
        }
        if self.chunking.chunk_size == 0 {
            return Err(RagError::Config("chunking.chunk_size must be > 0".into()));
        }
        if !(0.0..1.0).contains(&self.chunking.overlap_ratio) {
            return Err(RagError::Config(
                "chunking.overlap_ratio must be in [0.0, 1.0)".into(),
            ));
        }
        if self.ingestion.threads == 0 {
            return Err(RagError::Config("ingestion.threads must be > 0".into()));
        }
        if self.ingestion.url_timeout_secs == 0 {
            return Err(RagError::Config("ingestion.url_timeout_secs must be > 0".into()));
        }
        if self.search.default_k == 0 {
            return Err(RagError::Config("search.default_k must be > 0".into()));
        }
        if self.search.max_context_chars == 0 {
            return Err(RagError::Config("search.max_context_chars must be > 0".into()));
        }
        if self.generation.cost_per_1k_tokens < 0.0 {
            return Err(RagError::Config(
                "generation.cost_per_1k_tokens must be >= 0".into(),
            ));
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RagError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("neo-rag");

        Self {
            source_dir: PathBuf::from("source_documents"),
            store_path: data_dir.join("index.neostore"),
            embedding: EmbeddingConfig {
                model_dir: default_model_dir(&data_dir),
                ..Default::default()
            },
            data_dir,
            chunking: ChunkingConfig::default(),
            ingestion: IngestionConfig::default(),
            search: SearchConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

fn default_model_dir(data_dir: &Path) -> PathBuf {
    if let Ok(env_path) = std::env::var("MODEL_PATH") {
        PathBuf::from(env_path)
    } else {
        data_dir.join("models")
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Hashing,
            model_dir: PathBuf::from("models"),
            dimension: 384,
            batch_size: 32,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap_ratio: 0.2,
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            threads: 8,
            url_timeout_secs: 30,
            reserved_file_names: vec!["builder.url".to_string()],
            archive_depth: 3,
            show_progress: true,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_k: 4,
            metric: SimilarityMetric::Cosine,
            max_context_chars: 8192,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model_name: "mistral-7b-instruct".to_string(),
            persona: DEFAULT_PERSONA.to_string(),
            history_window: 2,
            cost_per_1k_tokens: 0.0,
        }
    }
}
