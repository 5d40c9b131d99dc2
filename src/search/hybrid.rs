use super::{RetrievalRequest, RetrievalResult, Retriever};
use crate::error::{IndexError, Result};
use crate::index::{normalize_path, IndexManager, SearchResult};
use crate::rerank::Reranker;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Fans a query out to every supporting retriever and merges the answers
///
/// Results are concatenated in registration order before deduplication, so
/// the first registered retriever wins a `(file_path, line_number)` tie.
pub struct HybridRetriever {
    retrievers: Vec<Arc<dyn Retriever>>,
    reranker: Option<Arc<dyn Reranker>>,
    manager: Option<Arc<IndexManager>>,
}

impl Default for HybridRetriever {
    fn default() -> Self {
        Self::new()
    }
}

impl HybridRetriever {
    pub fn new() -> Self {
        Self {
            retrievers: Vec::new(),
            reranker: None,
            manager: None,
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retrievers.push(retriever);
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Refuse queries for working directories the manager has never indexed
    pub fn with_manager(mut self, manager: Arc<IndexManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    pub fn retrievers(&self) -> &[Arc<dyn Retriever>] {
        &self.retrievers
    }

    fn order(&self, query: &str, mut results: Vec<SearchResult>) -> Vec<SearchResult> {
        if let Some(reranker) = &self.reranker {
            match reranker.rerank(query, results.clone()) {
                Ok(reranked) => return reranked,
                Err(e) => warn!("Reranking failed, falling back to score order: {}", e),
            }
        }
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results
    }
}

/// Keep the first result for every `(file_path, line_number)`
fn dedup(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert((r.file_path.clone(), r.line_number)))
        .collect()
}

#[async_trait]
impl Retriever for HybridRetriever {
    fn name(&self) -> &str {
        "hybrid"
    }

    fn supports_query(&self, query: &str) -> bool {
        self.retrievers.iter().any(|r| r.supports_query(query))
    }

    async fn retrieve(&self, cancel: &CancellationToken, request: &RetrievalRequest) -> Result<RetrievalResult> {
        let start = Instant::now();
        // Index rows are keyed by the canonical working directory
        let mut request = request.clone();
        request.options.working_directory = normalize_path(&request.options.working_directory);

        if let Some(manager) = &self.manager {
            let working_dir = &request.options.working_directory;
            if manager.get_index_status(working_dir).await.is_err() {
                return Err(IndexError::NotReady(working_dir.clone()));
            }
        }

        let eligible: Vec<Arc<dyn Retriever>> = self
            .retrievers
            .iter()
            .filter(|r| r.supports_query(&request.query))
            .cloned()
            .collect();

        let shared = Arc::new(request.clone());
        let mut tasks = JoinSet::new();
        for (slot, retriever) in eligible.iter().enumerate() {
            let retriever = Arc::clone(retriever);
            let request = Arc::clone(&shared);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let outcome = retriever.retrieve(&cancel, &request).await;
                (slot, outcome)
            });
        }

        let mut answers: Vec<Option<Vec<SearchResult>>> = vec![None; eligible.len()];
        let mut errors = Vec::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(IndexError::Cancelled);
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((slot, Ok(result)))) => answers[slot] = Some(result.results),
                    Some(Ok((_, Err(e)))) if e.is_cancelled() => return Err(IndexError::Cancelled),
                    Some(Ok((slot, Err(e)))) => {
                        warn!("Retriever {} failed: {}", eligible[slot].name(), e);
                        errors.push(format!("{}: {}", eligible[slot].name(), e));
                    }
                    Some(Err(e)) => {
                        warn!("Retriever task failed: {}", e);
                        errors.push(format!("retriever task: {}", e));
                    }
                }
            }
        }

        let succeeded = answers.iter().filter(|a| a.is_some()).count();
        let merged: Vec<SearchResult> = answers.into_iter().flatten().flatten().collect();
        let before_dedup = merged.len();
        let unique = dedup(merged);
        let total = unique.len();

        let mut results = self.order(&request.query, unique);
        results.truncate(request.max_results());

        debug!(
            "hybrid: {}/{} retriever(s), {} -> {} -> {} result(s)",
            succeeded,
            eligible.len(),
            before_dedup,
            total,
            results.len()
        );

        let mut outcome = RetrievalResult::new(results, start.elapsed())
            .with_metadata("retrievers_eligible", eligible.len())
            .with_metadata("retrievers_succeeded", succeeded)
            .with_metadata("retrievers_failed", errors.len())
            .with_metadata("total_before_dedup", before_dedup)
            .with_metadata("reranked", self.reranker.is_some());
        if !errors.is_empty() {
            outcome = outcome.with_metadata("errors", errors);
        }
        outcome.total_results = total;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexingConfig;
    use crate::file::DefaultFileFilter;
    use crate::index::SearchType;
    use crate::rerank::HeuristicReranker;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    /// Returns a fixed list, fails, or only supports some queries
    struct StaticRetriever {
        name: &'static str,
        results: Vec<SearchResult>,
        fail: bool,
        min_len: usize,
    }

    impl StaticRetriever {
        fn new(name: &'static str, hits: &[(&str, usize, f32)]) -> Self {
            Self {
                name,
                results: hits
                    .iter()
                    .map(|(file, line, score)| {
                        SearchResult::new(*file, *line, *line, name, *score, SearchType::FullText)
                    })
                    .collect(),
                fail: false,
                min_len: 0,
            }
        }
    }

    #[async_trait]
    impl Retriever for StaticRetriever {
        fn name(&self) -> &str {
            self.name
        }

        fn supports_query(&self, query: &str) -> bool {
            query.len() >= self.min_len
        }

        async fn retrieve(&self, _cancel: &CancellationToken, _request: &RetrievalRequest) -> Result<RetrievalResult> {
            if self.fail {
                return Err(IndexError::Embedding("model offline".into()));
            }
            Ok(RetrievalResult::new(self.results.clone(), Default::default()))
        }
    }

    #[tokio::test]
    async fn test_dedup_first_registered_wins() {
        let hybrid = HybridRetriever::new()
            .with_retriever(Arc::new(StaticRetriever::new("first", &[("/w/a.rs", 3, 0.1), ("/w/b.rs", 1, 0.5)])))
            .with_retriever(Arc::new(StaticRetriever::new("second", &[("/w/a.rs", 3, 0.9), ("/w/c.rs", 7, 0.7)])));

        let out = hybrid
            .retrieve(&CancellationToken::new(), &RetrievalRequest::new("q", "/w"))
            .await
            .unwrap();

        let keys: Vec<(&str, usize)> = out.results.iter().map(|r| r.location()).collect();
        assert_eq!(keys, vec![("/w/c.rs", 7), ("/w/b.rs", 1), ("/w/a.rs", 3)]);
        assert_eq!(out.results[2].content, "first");
        assert_eq!(out.total_results, 3);
        assert_eq!(out.metadata["total_before_dedup"], 4);
    }

    #[tokio::test]
    async fn test_failed_and_unsupported_retrievers() {
        let mut failing = StaticRetriever::new("broken", &[("/w/x.rs", 1, 1.0)]);
        failing.fail = true;
        let mut picky = StaticRetriever::new("picky", &[("/w/y.rs", 1, 1.0)]);
        picky.min_len = 100;

        let hybrid = HybridRetriever::new()
            .with_retriever(Arc::new(StaticRetriever::new("ok", &[("/w/a.rs", 1, 0.4)])))
            .with_retriever(Arc::new(failing))
            .with_retriever(Arc::new(picky));

        let out = hybrid
            .retrieve(&CancellationToken::new(), &RetrievalRequest::new("short", "/w"))
            .await
            .unwrap();
        assert_eq!(out.results.len(), 1);
        assert_eq!(out.metadata["retrievers_eligible"], 2);
        assert_eq!(out.metadata["retrievers_succeeded"], 1);
        assert_eq!(out.metadata["retrievers_failed"], 1);
    }

    #[tokio::test]
    async fn test_truncates_and_reranks() {
        let hybrid = HybridRetriever::new()
            .with_retriever(Arc::new(StaticRetriever::new(
                "fts",
                &[("/w/notes.txt", 1, 0.5), ("/w/parser.rs", 1, 0.5), ("/w/lexer.rs", 1, 0.5)],
            )))
            .with_reranker(Arc::new(HeuristicReranker::new()));

        let out = hybrid
            .retrieve(&CancellationToken::new(), &RetrievalRequest::new("parser", "/w").with_max_results(2))
            .await
            .unwrap();
        assert_eq!(out.results.len(), 2);
        assert_eq!(out.results[0].file_path, "/w/parser.rs");
        assert_eq!(out.results[1].file_path, "/w/lexer.rs");
        assert_eq!(out.total_results, 3);
    }

    #[tokio::test]
    async fn test_unknown_working_directory_is_not_ready() {
        let manager = Arc::new(IndexManager::new(
            Arc::new(DefaultFileFilter::default()),
            &IndexingConfig::default(),
        ));
        let hybrid = HybridRetriever::new()
            .with_retriever(Arc::new(StaticRetriever::new("ok", &[])))
            .with_manager(manager);

        let err = hybrid
            .retrieve(&CancellationToken::new(), &RetrievalRequest::new("q", Path::new("/nowhere")))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::NotReady(_)));
    }

    /// Reports the working directory it was asked about
    struct DirEcho;

    #[async_trait]
    impl Retriever for DirEcho {
        fn name(&self) -> &str {
            "dir_echo"
        }

        fn supports_query(&self, _query: &str) -> bool {
            true
        }

        async fn retrieve(&self, _cancel: &CancellationToken, request: &RetrievalRequest) -> Result<RetrievalResult> {
            let dir = request.options.working_directory.to_string_lossy().into_owned();
            Ok(RetrievalResult::new(
                vec![SearchResult::new(dir, 1, 1, "", 1.0, SearchType::FullText)],
                Default::default(),
            ))
        }
    }

    #[tokio::test]
    async fn test_working_directory_is_canonical() {
        let dir = tempfile::tempdir().unwrap();
        let canonical = dir.path().canonicalize().unwrap();
        let hybrid = HybridRetriever::new().with_retriever(Arc::new(DirEcho));

        let mut spellings = vec![dir.path().join(".")];
        #[cfg(unix)]
        {
            let link = dir.path().join("link");
            std::os::unix::fs::symlink(&canonical, &link).unwrap();
            spellings.push(link);
        }

        for spelling in spellings {
            let out = hybrid
                .retrieve(&CancellationToken::new(), &RetrievalRequest::new("q", &spelling))
                .await
                .unwrap();
            assert_eq!(out.results[0].file_path, canonical.to_string_lossy(), "{}", spelling.display());
        }
    }
}
