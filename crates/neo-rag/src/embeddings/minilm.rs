//! all-MiniLM-L6-v2 style sentence embeddings over ONNX Runtime.
//!
//! Expects a model directory holding `model.onnx` and a HuggingFace
//! `tokenizer.json`.

use anyhow::{anyhow, Result};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;

use super::EmbeddingModel;

const MAX_BATCH_SIZE: usize = 8;

#[derive(Clone, Debug)]
pub struct MiniLmConfig {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub dimension: usize,
    pub max_length: usize,
}

impl MiniLmConfig {
    pub fn from_model_dir(model_dir: &Path) -> Self {
        let base = if model_dir.join("all-MiniLM-L6-v2").exists() {
            model_dir.join("all-MiniLM-L6-v2")
        } else {
            model_dir.to_path_buf()
        };
        Self {
            model_path: base.join("model.onnx"),
            tokenizer_path: base.join("tokenizer.json"),
            dimension: 384,
            max_length: 256,
        }
    }
}

pub struct MiniLmEmbeddings {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    config: MiniLmConfig,
}

impl MiniLmEmbeddings {
    pub fn from_model_dir(model_dir: &Path) -> Result<Self> {
        Self::new(MiniLmConfig::from_model_dir(model_dir))
    }

    pub fn new(config: MiniLmConfig) -> Result<Self> {
        ort::init().with_name("neo_rag_embeddings").commit();

        if !config.model_path.exists() {
            return Err(anyhow!(
                "Model file not found at: {}",
                config.model_path.display()
            ));
        }

        let model_bytes = std::fs::read(&config.model_path)
            .map_err(|e| anyhow!("Failed to read model: {:?}", e))?;

        let num_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        let session = Session::builder()
            .map_err(|e| anyhow!("Session builder: {:?}", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow!("Optimization level: {:?}", e))?
            .with_intra_threads(num_threads)
            .map_err(|e| anyhow!("Intra threads: {:?}", e))?
            .commit_from_memory(&model_bytes)
            .map_err(|e| anyhow!("Failed to load model: {:?}", e))?;

        let tokenizer = Tokenizer::from_file(&config.tokenizer_path)
            .map_err(|e| {
                anyhow!(
                    "Failed to load tokenizer {}: {}",
                    config.tokenizer_path.display(),
                    e
                )
            })?;

        tracing::info!(
            model = %config.model_path.display(),
            dimension = config.dimension,
            threads = num_threads,
            "MiniLM embedding model loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            config,
        })
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(MAX_BATCH_SIZE) {
            let encodings = self
                .tokenizer
                .encode_batch(batch.to_vec(), true)
                .map_err(|e| anyhow!("Tokenization failed: {}", e))?;

            let padded_len = encodings
                .iter()
                .map(|e| e.get_ids().len().min(self.config.max_length))
                .max()
                .unwrap_or(0)
                .max(1);
            let batch_size = encodings.len();

            let mut input_ids = Vec::with_capacity(batch_size * padded_len);
            let mut attention_mask = Vec::with_capacity(batch_size * padded_len);

            for encoding in &encodings {
                let ids = encoding.get_ids();
                let mask = encoding.get_attention_mask();
                let len = ids.len().min(padded_len);
                for pos in 0..padded_len {
                    if pos < len {
                        input_ids.push(ids[pos] as i64);
                        attention_mask.push(mask[pos] as i64);
                    } else {
                        input_ids.push(0i64);
                        attention_mask.push(0i64);
                    }
                }
            }
            let token_type_ids = vec![0i64; batch_size * padded_len];

            let shape = vec![batch_size, padded_len];
            let ids_value = Value::from_array((shape.clone(), input_ids))
                .map_err(|e| anyhow!("input_ids tensor: {:?}", e))?;
            let mask_value = Value::from_array((shape.clone(), attention_mask.clone()))
                .map_err(|e| anyhow!("attention_mask tensor: {:?}", e))?;
            let type_value = Value::from_array((shape, token_type_ids))
                .map_err(|e| anyhow!("token_type_ids tensor: {:?}", e))?;

            let inputs = ort::inputs![
                "input_ids" => ids_value,
                "attention_mask" => mask_value,
                "token_type_ids" => type_value,
            ];

            let mut session = self.session.lock();
            let outputs = session
                .run(inputs)
                .map_err(|e| anyhow!("Batch inference failed: {:?}", e))?;

            let (shape, data) = outputs["last_hidden_state"]
                .try_extract_tensor::<f32>()
                .map_err(|e| anyhow!("Failed to extract last_hidden_state: {:?}", e))?;

            let seq_len = shape[1] as usize;
            let hidden_dim = shape[2] as usize;

            for sample_idx in 0..batch_size {
                let mask_offset = sample_idx * padded_len;
                let sample_offset = sample_idx * seq_len * hidden_dim;
                let mut pooled = vec![0.0f32; hidden_dim];
                let mut mask_sum = 0.0f32;

                // Mean pooling over attended tokens
                for pos in 0..seq_len.min(padded_len) {
                    let mask_val = attention_mask[mask_offset + pos] as f32;
                    if mask_val > 0.0 {
                        mask_sum += mask_val;
                        let offset = sample_offset + pos * hidden_dim;
                        for dim in 0..hidden_dim {
                            pooled[dim] += data[offset + dim] * mask_val;
                        }
                    }
                }

                if mask_sum > 0.0 {
                    for value in &mut pooled {
                        *value /= mask_sum;
                    }
                }

                all_embeddings.push(normalize_vec(pooled));
            }
        }

        Ok(all_embeddings)
    }
}

fn normalize_vec(mut vec: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for v in &mut vec {
            *v /= norm;
        }
    }
    vec
}

impl EmbeddingModel for MiniLmEmbeddings {
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| anyhow!("model returned no embedding"))
    }

    fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_query(text)
    }

    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn name(&self) -> &str {
        "all-MiniLM-L6-v2"
    }
}
