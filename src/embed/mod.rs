//! Embedding providers.

mod cache;
mod embedder;
mod hashing;

pub use cache::CachedProvider;
pub use embedder::{FastEmbedProvider, ModelType};
pub use hashing::HashingProvider;

use crate::config::{EmbeddingConfig, ProviderKind};
use crate::error::{IndexError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Turns text into fixed-size vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>>;

    /// One vector per input, in input order
    async fn generate_batch_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;
}

pub(crate) fn ensure_non_empty(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        Err(IndexError::Embedding("cannot embed empty text".into()))
    } else {
        Ok(())
    }
}

/// Build the configured provider, cached when it is model-backed
pub fn provider_from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        ProviderKind::FastEmbed => {
            let model: Arc<dyn EmbeddingProvider> = Arc::new(FastEmbedProvider::new(&config.model)?);
            Ok(Arc::new(CachedProvider::new(model, config.cache_size_mb)))
        }
        ProviderKind::Hashing => Ok(Arc::new(HashingProvider::new(config.dimensions))),
    }
}

/// Cosine similarity; 0 for mismatched lengths or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_hashing_provider_from_config() {
        let config = EmbeddingConfig {
            provider: ProviderKind::Hashing,
            dimensions: 48,
            ..Default::default()
        };
        let provider = provider_from_config(&config).unwrap();
        assert_eq!(provider.dimensions(), 48);
        assert_eq!(provider.model_name(), "hashing");
    }
}
