//! Error types for codeindex.

use std::path::PathBuf;

/// Errors produced while indexing or querying a working directory.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// IO error reading source files or store directories.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Full-text store error.
    #[error("full-text store error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    /// Query could not be parsed by the full-text store.
    #[error("query parse error: {0}")]
    QueryParse(#[from] tantivy::query::QueryParserError),

    /// LMDB store error (symbols, embeddings).
    #[error("key-value store error: {0}")]
    Heed(#[from] heed::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Config file could not be parsed.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// File watcher error.
    #[error("watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// Background task panicked or was aborted.
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Embedding provider failure.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Invalid configuration or missing collaborator.
    #[error("configuration error: {0}")]
    Config(String),

    /// The working directory has no usable index yet.
    #[error("index not ready for {}", .0.display())]
    NotReady(PathBuf),

    /// No index status is known for the working directory.
    #[error("no index found for {}", .0.display())]
    NotFound(PathBuf),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Some files of an update batch failed; the rest were committed.
    #[error("{index}: {} file(s) failed: {}", .failed.len(), join_failures(.failed))]
    PartialUpdate {
        index: String,
        failed: Vec<(PathBuf, String)>,
    },

    /// Several independent failures, e.g. one per index.
    #[error("{} error(s): {}", .0.len(), .0.join("; "))]
    Aggregate(Vec<String>),

    /// A store mutex was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IndexError {
    /// True when the error is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Build an aggregate error, or `None` when there is nothing to report.
    pub fn aggregate(errors: Vec<String>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self::Aggregate(errors))
        }
    }
}

fn join_failures(failed: &[(PathBuf, String)]) -> String {
    failed
        .iter()
        .map(|(path, err)| format!("{}: {}", path.display(), err))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
