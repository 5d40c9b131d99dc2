use super::{ensure_non_empty, EmbeddingProvider};
use crate::error::{IndexError, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel as FastEmbedModel, InitOptions, TextEmbedding};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Available embedding models
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// BGE Small EN v1.5 - 384 dimensions, good balance of speed/quality
    BGESmallENV15,
    /// All-MiniLM-L6-v2 - 384 dimensions, fast and efficient
    AllMiniLML6V2,
    /// BGE Base EN v1.5 - 768 dimensions, higher quality
    BGEBaseENV15,
    /// mxbai-embed-large-v1 - 1024 dimensions, best quality
    MxbaiEmbedLargeV1,
}

impl ModelType {
    const ALL: [ModelType; 4] = [
        Self::BGESmallENV15,
        Self::AllMiniLML6V2,
        Self::BGEBaseENV15,
        Self::MxbaiEmbedLargeV1,
    ];

    pub fn to_fastembed_model(&self) -> FastEmbedModel {
        match self {
            Self::BGESmallENV15 => FastEmbedModel::BGESmallENV15,
            Self::AllMiniLML6V2 => FastEmbedModel::AllMiniLML6V2,
            Self::BGEBaseENV15 => FastEmbedModel::BGEBaseENV15,
            Self::MxbaiEmbedLargeV1 => FastEmbedModel::MxbaiEmbedLargeV1,
        }
    }

    pub fn dimensions(&self) -> usize {
        match self {
            Self::BGESmallENV15 => 384,
            Self::AllMiniLML6V2 => 384,
            Self::BGEBaseENV15 => 768,
            Self::MxbaiEmbedLargeV1 => 1024,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BGESmallENV15 => "BAAI/bge-small-en-v1.5",
            Self::AllMiniLML6V2 => "sentence-transformers/all-MiniLM-L6-v2",
            Self::BGEBaseENV15 => "BAAI/bge-base-en-v1.5",
            Self::MxbaiEmbedLargeV1 => "mixedbread-ai/mxbai-embed-large-v1",
        }
    }

    /// Look up a model by its full name or the part after the slash
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = name.to_lowercase();
        Self::ALL.into_iter().find(|m| {
            let full = m.name().to_lowercase();
            full == wanted || full.rsplit('/').next() == Some(wanted.as_str())
        })
    }
}

impl Default for ModelType {
    fn default() -> Self {
        Self::BGESmallENV15
    }
}

/// Local ONNX embeddings through fastembed
pub struct FastEmbedProvider {
    model: Arc<Mutex<TextEmbedding>>,
    model_type: ModelType,
}

impl FastEmbedProvider {
    /// Load (downloading on first use) the named model
    pub fn new(model_name: &str) -> Result<Self> {
        let model_type = ModelType::from_name(model_name).ok_or_else(|| {
            IndexError::Config(format!("unknown embedding model: {}", model_name))
        })?;
        Self::with_model(model_type)
    }

    pub fn with_model(model_type: ModelType) -> Result<Self> {
        info!(
            "Loading embedding model {} ({} dims)",
            model_type.name(),
            model_type.dimensions()
        );

        let model = TextEmbedding::try_new(
            InitOptions::new(model_type.to_fastembed_model()).with_show_download_progress(false),
        )
        .map_err(|e| IndexError::Embedding(format!("failed to initialize model: {}", e)))?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            model_type,
        })
    }

    pub fn model_type(&self) -> ModelType {
        self.model_type
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        ensure_non_empty(text)?;
        self.generate_batch_embeddings(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| IndexError::Embedding("no embedding generated".into()))
    }

    async fn generate_batch_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        for text in texts {
            ensure_non_empty(text)?;
        }

        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        // ONNX inference is CPU-bound
        tokio::task::spawn_blocking(move || {
            let mut model = model.lock().map_err(|_| IndexError::LockPoisoned)?;
            model
                .embed(texts, None)
                .map_err(|e| IndexError::Embedding(format!("failed to generate embeddings: {}", e)))
        })
        .await?
    }

    fn dimensions(&self) -> usize {
        self.model_type.dimensions()
    }

    fn model_name(&self) -> &str {
        self.model_type.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_type_dimensions() {
        assert_eq!(ModelType::BGESmallENV15.dimensions(), 384);
        assert_eq!(ModelType::AllMiniLML6V2.dimensions(), 384);
        assert_eq!(ModelType::BGEBaseENV15.dimensions(), 768);
        assert_eq!(ModelType::MxbaiEmbedLargeV1.dimensions(), 1024);
    }

    #[test]
    fn test_model_lookup_by_name() {
        assert_eq!(
            ModelType::from_name("BAAI/bge-small-en-v1.5"),
            Some(ModelType::BGESmallENV15)
        );
        assert_eq!(
            ModelType::from_name("all-minilm-l6-v2"),
            Some(ModelType::AllMiniLML6V2)
        );
        assert_eq!(ModelType::from_name("gpt-5"), None);
    }

    #[test]
    fn test_unknown_model_is_config_error() {
        assert!(matches!(
            FastEmbedProvider::new("nope/nope"),
            Err(IndexError::Config(_))
        ));
    }

    #[tokio::test]
    #[ignore] // Requires downloading model
    async fn test_embed_single_text() {
        let provider = FastEmbedProvider::with_model(ModelType::default()).unwrap();
        let embedding = provider.generate_embedding("Hello, world!").await.unwrap();

        assert_eq!(embedding.len(), 384);
        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.1);
    }
}
