use candle_core::Device;
use pylate_rs::ColBERT;

use crate::error::{Error, Result};

pub const DEFAULT_MODEL_ID: &str = "lightonai/GTE-ModernColBERT-v1";
pub const MODEL_ENV_VAR: &str = "CAMPUSQ_MODEL";

/// Maps text to a fixed-length dense vector.
///
/// Implementations must be deterministic for a fixed model: the same text
/// always yields the same vector. Empty input is an error, never a silent
/// zero vector.
pub trait TextEncoder {
    fn encode(&mut self, text: &str) -> Result<Vec<f32>>;
}

impl<T: TextEncoder + ?Sized> TextEncoder for Box<T> {
    fn encode(&mut self, text: &str) -> Result<Vec<f32>> {
        (**self).encode(text)
    }
}

/// Select the best available compute device.
///
/// Uses CUDA when compiled with the `cuda` feature, Metal when compiled with
/// the `metal` feature, and falls back to CPU otherwise.
fn default_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            return device;
        }
    }

    Device::Cpu
}

/// Sentence encoder backed by a local late-interaction model.
///
/// The model emits one embedding per token; `encode` mean-pools them into a
/// single L2-normalized sentence vector, so cosine similarity between two
/// encoded texts reduces to a dot product of unit vectors.
///
/// Loading is eager: a missing or broken model surfaces here, before the
/// engine accepts any query or ingest call.
pub struct SentenceEncoder {
    model: ColBERT,
    model_id: String,
}

impl SentenceEncoder {
    /// Load the model, downloading from HuggingFace Hub if needed.
    pub fn load(model_id: &str) -> Result<Self> {
        tracing::info!(model_id, "loading sentence embedding model");
        let device = default_device();
        let model: ColBERT = ColBERT::from(model_id)
            .with_device(device)
            .try_into()
            .map_err(|e| {
                Error::Model(format!("failed to load model {model_id}: {e}"))
            })?;
        tracing::info!(model_id, "model loaded");

        Ok(Self {
            model,
            model_id: model_id.to_string(),
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

impl TextEncoder for SentenceEncoder {
    fn encode(&mut self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::EmptyInput);
        }

        let embeddings = self
            .model
            .encode(&[text.to_string()], false)
            .map_err(|e| Error::Model(format!("encoding failed: {e}")))?;

        // [1, num_tokens, dimension] -> [num_tokens, dimension] -> [dimension]
        let pooled = embeddings
            .squeeze(0)
            .and_then(|t| t.mean(0))
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(|e| {
                Error::Model(format!("unexpected embedding tensor shape: {e}"))
            })?;

        Ok(l2_normalize(pooled))
    }
}

/// Scale a vector to unit length. Zero vectors are returned unchanged.
fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_produces_unit_length() {
        let v = l2_normalize(vec![3.0, 4.0]);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn normalize_leaves_zero_vector_alone() {
        let v = l2_normalize(vec![0.0, 0.0, 0.0]);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }
}
