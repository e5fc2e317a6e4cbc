use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// Plain text produced by a loader from one source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(content: impl Into<String>, source_path: impl AsRef<Path>) -> Self {
        Self {
            content: content.into(),
            metadata: DocumentMetadata {
                source_path: source_path.as_ref().to_path_buf(),
                ..Default::default()
            },
        }
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.metadata.encoding = Some(encoding.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.extra.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_path: PathBuf,
    pub chunk_index: usize,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// A bounded text window; the unit stored in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(
        content: impl Into<String>,
        source_path: impl AsRef<Path>,
        chunk_index: usize,
    ) -> Self {
        Self {
            content: content.into(),
            metadata: ChunkMetadata {
                source_path: source_path.as_ref().to_path_buf(),
                chunk_index,
                extra: BTreeMap::new(),
            },
        }
    }

    /// Flattened string view of the metadata, as shown to callers.
    pub fn metadata_map(&self) -> BTreeMap<String, String> {
        let mut map = self.metadata.extra.clone();
        map.insert(
            "source".to_string(),
            self.metadata.source_path.to_string_lossy().to_string(),
        );
        map.insert("chunk_index".to_string(), self.metadata.chunk_index.to_string());
        map
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    Euclidean,
}

impl SimilarityMetric {
    /// Whether a larger score means a closer match.
    pub fn higher_is_better(self) -> bool {
        matches!(self, Self::Cosine)
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cosine => write!(f, "cosine"),
            Self::Euclidean => write!(f, "euclidean"),
        }
    }
}

impl FromStr for SimilarityMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            other => Err(format!("unknown similarity metric: {}", other)),
        }
    }
}

/// One ranked result from a store search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}

impl SearchHit {
    /// Originating chunk metadata augmented with the computed score.
    pub fn metadata(&self) -> BTreeMap<String, String> {
        let mut map = self.chunk.metadata_map();
        map.insert("score".to_string(), self.score.to_string());
        map
    }

    pub fn source(&self) -> &Path {
        &self.chunk.metadata.source_path
    }
}
