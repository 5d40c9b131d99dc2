//! Retrievers: uniform query adapters over the indexes, and the hybrid
//! retriever that merges them.

mod hybrid;
mod index;
mod recent;

pub use hybrid::HybridRetriever;
pub use index::{FtsRetriever, SemanticRetriever, SymbolRetriever};
pub use recent::RecentFilesRetriever;

use crate::error::Result;
use crate::file::Language;
use crate::index::{SearchOptions, SearchResult};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A query against one working directory
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalRequest {
    pub query: String,
    pub options: SearchOptions,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            query: query.into(),
            options: SearchOptions::new(working_directory),
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.options.max_results = max_results;
        self
    }

    pub fn with_languages(mut self, languages: Vec<Language>) -> Self {
        self.options = self.options.with_languages(languages);
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.options = self.options.with_extensions(extensions);
        self
    }

    pub fn max_results(&self) -> usize {
        self.options.max_results
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalResult {
    pub results: Vec<SearchResult>,
    /// Candidates seen before truncation
    pub total_results: usize,
    pub latency: Duration,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl RetrievalResult {
    pub fn new(results: Vec<SearchResult>, latency: Duration) -> Self {
        Self {
            total_results: results.len(),
            results,
            latency,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// One source of ranked results
#[async_trait]
pub trait Retriever: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this retriever has anything useful to say about `query`
    fn supports_query(&self, query: &str) -> bool;

    async fn retrieve(&self, cancel: &CancellationToken, request: &RetrievalRequest) -> Result<RetrievalResult>;
}

/// Identifier-looking queries: letters, digits, `_` and `.`
pub fn is_identifier_query(query: &str) -> bool {
    !query.is_empty() && query.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_queries() {
        assert!(is_identifier_query("parseConfig"));
        assert!(is_identifier_query("config.Load"));
        assert!(is_identifier_query("MAX_SIZE"));
        assert!(!is_identifier_query(""));
        assert!(!is_identifier_query("parse config"));
        assert!(!is_identifier_query("fn()"));
    }

    #[test]
    fn test_request_builders() {
        let request = RetrievalRequest::new("query", "/repo")
            .with_max_results(5)
            .with_extensions(vec![".RS".to_string()]);
        assert_eq!(request.max_results(), 5);
        assert_eq!(request.options.extensions, vec!["rs".to_string()]);
    }
}
