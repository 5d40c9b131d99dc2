use super::{is_identifier_query, RetrievalRequest, RetrievalResult, Retriever};
use crate::error::{IndexError, Result};
use crate::index::Index;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Run one index search, giving up as soon as `cancel` fires
async fn search_index(
    retriever: &str,
    index: &dyn Index,
    cancel: &CancellationToken,
    request: &RetrievalRequest,
) -> Result<RetrievalResult> {
    let start = Instant::now();
    let results = tokio::select! {
        results = index.search(&request.query, &request.options) => results?,
        _ = cancel.cancelled() => return Err(IndexError::Cancelled),
    };
    debug!("{} retriever: {} result(s) in {:?}", retriever, results.len(), start.elapsed());
    Ok(RetrievalResult::new(results, start.elapsed()).with_metadata("index", index.name()))
}

/// Keyword search over the full-text index
pub struct FtsRetriever {
    index: Arc<dyn Index>,
}

impl FtsRetriever {
    pub fn new(index: Arc<dyn Index>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Retriever for FtsRetriever {
    fn name(&self) -> &str {
        "fts"
    }

    fn supports_query(&self, _query: &str) -> bool {
        true
    }

    async fn retrieve(&self, cancel: &CancellationToken, request: &RetrievalRequest) -> Result<RetrievalResult> {
        search_index(self.name(), self.index.as_ref(), cancel, request).await
    }
}

/// Declaration lookup over the symbol index
pub struct SymbolRetriever {
    index: Arc<dyn Index>,
}

impl SymbolRetriever {
    pub fn new(index: Arc<dyn Index>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Retriever for SymbolRetriever {
    fn name(&self) -> &str {
        "symbol"
    }

    fn supports_query(&self, query: &str) -> bool {
        is_identifier_query(query)
    }

    async fn retrieve(&self, cancel: &CancellationToken, request: &RetrievalRequest) -> Result<RetrievalResult> {
        search_index(self.name(), self.index.as_ref(), cancel, request).await
    }
}

/// Vector similarity over the embedding index
pub struct SemanticRetriever {
    index: Arc<dyn Index>,
    min_query_length: usize,
}

impl SemanticRetriever {
    pub const DEFAULT_MIN_QUERY_LENGTH: usize = 10;

    pub fn new(index: Arc<dyn Index>) -> Self {
        Self {
            index,
            min_query_length: Self::DEFAULT_MIN_QUERY_LENGTH,
        }
    }

    pub fn with_min_query_length(mut self, min_query_length: usize) -> Self {
        self.min_query_length = min_query_length;
        self
    }
}

#[async_trait]
impl Retriever for SemanticRetriever {
    fn name(&self) -> &str {
        "semantic"
    }

    fn supports_query(&self, query: &str) -> bool {
        query.chars().count() >= self.min_query_length
    }

    async fn retrieve(&self, cancel: &CancellationToken, request: &RetrievalRequest) -> Result<RetrievalResult> {
        search_index(self.name(), self.index.as_ref(), cancel, request).await
    }
}
