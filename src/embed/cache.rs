use super::EmbeddingProvider;
use crate::cache::{CacheStats, EmbeddingCache};
use crate::error::{IndexError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Provider decorator that memoizes vectors by model and text
pub struct CachedProvider {
    inner: Arc<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
}

impl CachedProvider {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, max_memory_mb: usize) -> Self {
        Self {
            inner,
            cache: EmbeddingCache::new(max_memory_mb),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[async_trait]
impl EmbeddingProvider for CachedProvider {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let key = EmbeddingCache::key(self.inner.model_name(), text);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.as_ref().clone());
        }
        let embedding = self.inner.generate_embedding(text).await?;
        self.cache.insert(key, embedding.clone());
        Ok(embedding)
    }

    async fn generate_batch_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self.inner.model_name().to_string();
        let keys: Vec<String> = texts.iter().map(|t| EmbeddingCache::key(&model, t)).collect();

        let mut out: Vec<Option<Vec<f32>>> = keys
            .iter()
            .map(|k| self.cache.get(k).map(|v| v.as_ref().clone()))
            .collect();

        let missing: Vec<usize> = (0..texts.len()).filter(|&i| out[i].is_none()).collect();
        if !missing.is_empty() {
            debug!(
                "Embedding cache: {} hit(s), {} miss(es)",
                texts.len() - missing.len(),
                missing.len()
            );
            let batch: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();
            let fresh = self.inner.generate_batch_embeddings(&batch).await?;
            if fresh.len() != batch.len() {
                return Err(IndexError::Embedding(format!(
                    "provider returned {} embeddings for {} texts",
                    fresh.len(),
                    batch.len()
                )));
            }
            for (i, embedding) in missing.into_iter().zip(fresh) {
                self.cache.insert(keys[i].clone(), embedding.clone());
                out[i] = Some(embedding);
            }
        }

        Ok(out.into_iter().flatten().collect())
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashingProvider;

    #[tokio::test]
    async fn test_batch_hits_cache_on_second_call() {
        let provider = CachedProvider::new(Arc::new(HashingProvider::new(32)), 8);
        let texts = vec!["alpha beta".to_string(), "gamma".to_string()];

        let first = provider.generate_batch_embeddings(&texts).await.unwrap();
        let second = provider.generate_batch_embeddings(&texts).await.unwrap();

        assert_eq!(first, second);
        let stats = provider.cache_stats();
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits, 2);
    }

    #[tokio::test]
    async fn test_single_and_batch_share_entries() {
        let provider = CachedProvider::new(Arc::new(HashingProvider::new(32)), 8);
        let single = provider.generate_embedding("shared text").await.unwrap();
        let batch = provider
            .generate_batch_embeddings(&["shared text".to_string()])
            .await
            .unwrap();
        assert_eq!(batch, vec![single]);
        assert_eq!(provider.cache_stats().hits, 1);
    }
}
