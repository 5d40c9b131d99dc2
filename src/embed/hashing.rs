use super::{ensure_non_empty, EmbeddingProvider};
use crate::error::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Offline provider: a signed bag of hashed lowercase tokens, L2-normalized
///
/// Texts sharing identifiers land near each other, which is enough for
/// tests and air-gapped machines. Not a semantic model.
pub struct HashingProvider {
    dimensions: usize,
}

impl HashingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in tokens(text) {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
            ]) as usize
                % self.dimensions;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashingProvider {
    fn default() -> Self {
        Self::new(384)
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        ensure_non_empty(text)?;
        Ok(self.embed(text))
    }

    async fn generate_batch_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|text| {
                ensure_non_empty(text)?;
                Ok(self.embed(text))
            })
            .collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "hashing"
    }
}
