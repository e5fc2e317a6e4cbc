//! Single-file store format: the embedding matrix and its co-indexed chunk list.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::types::{Chunk, ChunkMetadata};

pub const STORE_EXTENSION: &str = "neostore";
pub const DEFAULT_STORE_FILE: &str = "index.neostore";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StoreFile {
    pub version: u32,
    pub model: String,
    pub rows: u64,
    pub dimension: u64,
    /// Row-major `rows × dimension`.
    pub embeddings: Vec<f32>,
    pub chunks: Vec<StoredChunk>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StoredChunk {
    pub content: String,
    /// JSON-encoded [`ChunkMetadata`]; bincode cannot carry skipped fields.
    pub metadata: String,
}

/// Where a store lives for a user-supplied path: files ending in `.neostore`
/// are used as-is, anything else is treated as a directory.
pub fn resolve_store_path(path: &Path) -> PathBuf {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case(STORE_EXTENSION) => path.to_path_buf(),
        _ => path.join(DEFAULT_STORE_FILE),
    }
}

impl StoreFile {
    pub fn from_parts(model: &str, vectors: &Array2<f32>, chunks: &[Chunk]) -> Result<Self> {
        let stored = chunks
            .iter()
            .map(|c| {
                Ok(StoredChunk {
                    content: c.content.clone(),
                    metadata: serde_json::to_string(&c.metadata)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            version: FORMAT_VERSION,
            model: model.to_string(),
            rows: vectors.nrows() as u64,
            dimension: vectors.ncols() as u64,
            embeddings: vectors.iter().copied().collect(),
            chunks: stored,
        })
    }

    /// Validate and split into the matrix and chunk list.
    pub fn into_parts(self, path: &Path) -> Result<(Array2<f32>, Vec<Chunk>)> {
        if self.version != FORMAT_VERSION {
            return Err(RagError::corrupt(
                path,
                format!("unsupported format version {}", self.version),
            ));
        }
        let rows = self.rows as usize;
        let dimension = self.dimension as usize;
        if self.chunks.len() != rows {
            return Err(RagError::corrupt(
                path,
                format!("{} vectors but {} chunk entries", rows, self.chunks.len()),
            ));
        }
        if rows.checked_mul(dimension) != Some(self.embeddings.len()) {
            return Err(RagError::corrupt(
                path,
                format!(
                    "embedding matrix holds {} values, expected {} x {}",
                    self.embeddings.len(),
                    rows,
                    dimension
                ),
            ));
        }

        let vectors = Array2::from_shape_vec((rows, dimension), self.embeddings)
            .map_err(|e| RagError::corrupt(path, e.to_string()))?;

        let chunks = self
            .chunks
            .into_iter()
            .enumerate()
            .map(|(i, stored)| {
                let metadata: ChunkMetadata = serde_json::from_str(&stored.metadata).map_err(|e| {
                    RagError::corrupt(path, format!("chunk {} metadata: {}", i, e))
                })?;
                Ok(Chunk {
                    content: stored.content,
                    metadata,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((vectors, chunks))
    }
}

/// Write to a sibling temp file, then rename over the target.
pub(crate) fn write_store_file(path: &Path, file: &StoreFile) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension(format!("{}.tmp", STORE_EXTENSION));
    {
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        bincode::serialize_into(&mut writer, file)
            .map_err(|e| RagError::Io(std::io::Error::other(e.to_string())))?;
        writer.flush()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

pub(crate) fn read_store_file(path: &Path) -> Result<StoreFile> {
    let reader = BufReader::new(File::open(path)?);
    bincode::deserialize_from(reader)
        .map_err(|e| RagError::corrupt(path, format!("undecodable store file: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_store_path() {
        assert_eq!(
            resolve_store_path(Path::new("/data/docs.neostore")),
            PathBuf::from("/data/docs.neostore")
        );
        assert_eq!(
            resolve_store_path(Path::new("/data/stores")),
            PathBuf::from("/data/stores/index.neostore")
        );
    }

    #[test]
    fn test_version_mismatch_is_corrupt() {
        let vectors = Array2::<f32>::zeros((1, 2));
        let chunks = vec![Chunk::new("x", "a.txt", 0)];
        let mut file = StoreFile::from_parts("m", &vectors, &chunks).unwrap();
        file.version = 99;
        assert!(matches!(
            file.into_parts(Path::new("s.neostore")),
            Err(RagError::CorruptStore { .. })
        ));
    }

    #[test]
    fn test_short_matrix_is_corrupt() {
        let vectors = Array2::<f32>::zeros((2, 3));
        let chunks = vec![Chunk::new("a", "a.txt", 0), Chunk::new("b", "a.txt", 1)];
        let mut file = StoreFile::from_parts("m", &vectors, &chunks).unwrap();
        file.embeddings.pop();
        assert!(matches!(
            file.into_parts(Path::new("s.neostore")),
            Err(RagError::CorruptStore { .. })
        ));
    }

    #[test]
    fn test_truncated_bytes_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.neostore");
        let vectors = Array2::<f32>::ones((4, 8));
        let chunks: Vec<Chunk> = (0..4)
            .map(|i| Chunk::new(format!("chunk {i}"), "a.txt", i))
            .collect();
        write_store_file(&path, &StoreFile::from_parts("m", &vectors, &chunks).unwrap()).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        assert!(matches!(read_store_file(&path), Err(RagError::CorruptStore { .. })));
    }

    #[test]
    fn test_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("s.neostore");
        let vectors = Array2::<f32>::ones((1, 2));
        let chunks = vec![Chunk::new("only", "a.txt", 0)];
        write_store_file(&path, &StoreFile::from_parts("m", &vectors, &chunks).unwrap()).unwrap();

        let names: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("s.neostore")]);
    }
}
