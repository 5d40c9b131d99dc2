use crate::error::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Global configuration for codeindex
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory for persisted index stores
    pub data_dir: PathBuf,

    /// Chunking configuration
    pub chunking: ChunkingConfig,

    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,

    /// Indexing configuration
    pub indexing: IndexingConfig,

    /// Retrieval configuration
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub max_chunk_size: usize,

    /// Chunks (and whole files) smaller than this are not emitted on their own
    pub min_chunk_size: usize,

    /// Characters carried over from a chunk that was closed for size
    pub overlap_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// ONNX models through fastembed
    FastEmbed,
    /// Deterministic token hashing, works offline
    Hashing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which provider generates vectors
    pub provider: ProviderKind,

    /// Model name (e.g., "BAAI/bge-small-en-v1.5")
    pub model: String,

    /// Vector size for the hashing provider
    pub dimensions: usize,

    /// Batch size for embedding
    pub batch_size: usize,

    /// Cache size in MB
    pub cache_size_mb: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Files above this size are skipped
    pub max_file_size: u64,

    /// Build status is refreshed every this many discovered files
    pub status_update_interval: usize,

    /// Full-text writes are committed every this many files
    pub commit_interval: usize,

    /// Poll interval for `wait_for_index`, in milliseconds
    pub poll_interval_ms: u64,

    /// LMDB map size in MB
    pub map_size_mb: usize,

    /// Respect .gitignore files
    pub respect_gitignore: bool,

    /// Debounce window for the file watcher, in milliseconds
    pub watch_debounce_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Default number of results returned by a hybrid query
    pub max_results: usize,

    /// Queries shorter than this skip semantic search
    pub semantic_min_query_length: usize,

    /// Apply the heuristic reranker to merged results
    pub rerank: bool,
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults when it is missing
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path(),
        };

        let config = if path.exists() {
            debug!("Loading config from {}", path.display());
            let text = std::fs::read_to_string(&path)?;
            toml::from_str::<Config>(&text)?
        } else {
            debug!("No config at {}, using defaults", path.display());
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Default config location: `~/.codeindex/config.toml`
    pub fn default_path() -> PathBuf {
        default_data_dir().join("config.toml")
    }

    /// Reject settings the chunker and indexes cannot work with
    pub fn validate(&self) -> Result<()> {
        let c = &self.chunking;
        if c.max_chunk_size == 0 {
            return Err(IndexError::Config("chunking.max_chunk_size must be > 0".into()));
        }
        if c.min_chunk_size >= c.max_chunk_size {
            return Err(IndexError::Config(format!(
                "chunking.min_chunk_size ({}) must be smaller than max_chunk_size ({})",
                c.min_chunk_size, c.max_chunk_size
            )));
        }
        if c.overlap_size >= c.max_chunk_size {
            return Err(IndexError::Config(format!(
                "chunking.overlap_size ({}) must be smaller than max_chunk_size ({})",
                c.overlap_size, c.max_chunk_size
            )));
        }
        if self.embedding.batch_size == 0 {
            return Err(IndexError::Config("embedding.batch_size must be > 0".into()));
        }
        if self.embedding.provider == ProviderKind::Hashing && self.embedding.dimensions == 0 {
            return Err(IndexError::Config("embedding.dimensions must be > 0".into()));
        }
        if self.indexing.status_update_interval == 0 || self.indexing.commit_interval == 0 {
            return Err(IndexError::Config(
                "indexing intervals must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Get the data directory, creating it if necessary
    pub fn data_dir(&self) -> Result<PathBuf> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)?;
        }
        Ok(self.data_dir.clone())
    }
}

impl IndexingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn map_size_bytes(&self) -> usize {
        self.map_size_mb * 1024 * 1024
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".codeindex"))
        .unwrap_or_else(|| PathBuf::from(".codeindex"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            indexing: IndexingConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 1500,
            min_chunk_size: 10,
            overlap_size: 200,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::FastEmbed,
            model: "BAAI/bge-small-en-v1.5".to_string(),
            dimensions: 384,
            batch_size: 32,
            cache_size_mb: 64,
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            max_file_size: 1024 * 1024,
            status_update_interval: 100,
            commit_interval: 64,
            poll_interval_ms: 500,
            map_size_mb: 2048,
            respect_gitignore: true,
            watch_debounce_ms: 500,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: 20,
            semantic_min_query_length: 10,
            rerank: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_load_partial_toml() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
data_dir = "/tmp/codeindex-test"

[embedding]
provider = "hashing"
dimensions = 64

[chunking]
max_chunk_size = 800
"#,
        )?;

        let config = Config::load(Some(&path))?;
        assert_eq!(config.data_dir, PathBuf::from("/tmp/codeindex-test"));
        assert_eq!(config.embedding.provider, ProviderKind::Hashing);
        assert_eq!(config.embedding.dimensions, 64);
        assert_eq!(config.embedding.batch_size, 32);
        assert_eq!(config.chunking.max_chunk_size, 800);
        assert_eq!(config.chunking.overlap_size, 200);
        Ok(())
    }

    #[test]
    fn test_missing_file_uses_defaults() -> Result<()> {
        let dir = tempdir()?;
        let config = Config::load(Some(&dir.path().join("nope.toml")))?;
        assert_eq!(config.retrieval.max_results, 20);
        Ok(())
    }

    #[test]
    fn test_overlap_must_be_smaller_than_max() {
        let mut config = Config::default();
        config.chunking.overlap_size = config.chunking.max_chunk_size;
        assert!(matches!(config.validate(), Err(IndexError::Config(_))));
    }
}
