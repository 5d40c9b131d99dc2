use moka::sync::Cache;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Memory-bounded embedding cache keyed by model and text hash
pub struct EmbeddingCache {
    cache: Cache<String, Arc<Vec<f32>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    max_memory_mb: usize,
}

impl EmbeddingCache {
    pub fn new(max_memory_mb: usize) -> Self {
        // Weigh entries by vector bytes so the budget holds across dimensions
        let cache = Cache::builder()
            .max_capacity((max_memory_mb * 1024 * 1024) as u64)
            .weigher(|key: &String, value: &Arc<Vec<f32>>| {
                (key.len() + value.len() * std::mem::size_of::<f32>()).min(u32::MAX as usize) as u32
            })
            .build();

        Self {
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            max_memory_mb,
        }
    }

    /// Cache key for `text` embedded by `model`
    pub fn key(model: &str, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<Arc<Vec<f32>>> {
        match self.cache.get(key) {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: String, embedding: Vec<f32>) -> Arc<Vec<f32>> {
        let value = Arc::new(embedding);
        self.cache.insert(key, value.clone());
        value
    }

    /// Get or compute an embedding
    pub fn get_or_compute<F>(&self, key: &str, compute: F) -> Arc<Vec<f32>>
    where
        F: FnOnce() -> Vec<f32>,
    {
        match self.get(key) {
            Some(value) => value,
            None => self.insert(key.to_string(), compute()),
        }
    }

    /// Get cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        self.cache.run_pending_tasks();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.cache.entry_count(),
            max_memory_mb: self.max_memory_mb,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: u64,
    pub max_memory_mb: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache() {
        let cache = EmbeddingCache::new(100);

        let result = cache.get_or_compute("test", || vec![1.0, 2.0, 3.0]);
        assert_eq!(*result, vec![1.0, 2.0, 3.0]);

        let again = cache.get_or_compute("test", || vec![9.0]);
        assert_eq!(*again, vec![1.0, 2.0, 3.0]);

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.size, 1);
        assert!((cache.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_key_depends_on_model() {
        assert_ne!(EmbeddingCache::key("a", "text"), EmbeddingCache::key("b", "text"));
        assert_eq!(EmbeddingCache::key("a", "text"), EmbeddingCache::key("a", "text"));
    }
}
