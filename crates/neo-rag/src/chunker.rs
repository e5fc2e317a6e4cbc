use crate::error::{RagError, Result};
use crate::types::{Chunk, ChunkMetadata, Document};

/// Fixed-size sliding-window splitter measured in characters.
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    chunk_size: usize,
    overlap_size: usize,
}

impl TextChunker {
    pub fn new(chunk_size: usize, overlap_ratio: f32) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::InvalidArgument("chunk_size must be > 0".into()));
        }
        if !(0.0..1.0).contains(&overlap_ratio) {
            return Err(RagError::InvalidArgument(format!(
                "overlap_ratio must be in [0, 1), got {}",
                overlap_ratio
            )));
        }
        let overlap_size = (chunk_size as f64 * overlap_ratio as f64).floor() as usize;
        Ok(Self {
            chunk_size,
            // ratio < 1 keeps this below chunk_size; float rounding on huge sizes
            // could still touch it
            overlap_size: overlap_size.min(chunk_size - 1),
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap_size(&self) -> usize {
        self.overlap_size
    }

    pub fn step(&self) -> usize {
        self.chunk_size - self.overlap_size
    }

    /// Split `text` into trimmed windows of at most `chunk_size` characters.
    pub fn split(&self, text: &str) -> Vec<String> {
        // Byte offset of every char start, plus the end sentinel.
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_count = boundaries.len() - 1;

        let step = self.step();
        let mut chunks = Vec::with_capacity(char_count / step + 1);
        let mut start = 0;
        while start < char_count {
            let end = (start + self.chunk_size).min(char_count);
            let window = text[boundaries[start]..boundaries[end]].trim();
            if !window.is_empty() {
                chunks.push(window.to_string());
            }
            start += step;
        }
        chunks
    }

    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        self.split(&document.content)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, content)| Chunk {
                content,
                metadata: ChunkMetadata {
                    source_path: document.metadata.source_path.clone(),
                    chunk_index,
                    extra: document.metadata.extra.clone(),
                },
            })
            .collect()
    }

    pub fn chunk_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents.iter().flat_map(|d| self.chunk_document(d)).collect()
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap_size: 200,
        }
    }
}

/// Convenience wrapper over [`TextChunker::split`].
pub fn split(text: &str, chunk_size: usize, overlap_ratio: f32) -> Result<Vec<String>> {
    Ok(TextChunker::new(chunk_size, overlap_ratio)?.split(text))
}
