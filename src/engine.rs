//! Wiring of stores, indexes, retrievers and the manager from one [`Config`].

use crate::chunker::Chunker;
use crate::config::Config;
use crate::embed::{provider_from_config, EmbeddingProvider};
use crate::error::Result;
use crate::file::{DefaultFileFilter, FileFilter};
use crate::fts::FullTextIndex;
use crate::index::{Index, IndexManager, IndexStatus};
use crate::parser::TreeSitterParser;
use crate::rerank::HeuristicReranker;
use crate::search::{
    FtsRetriever, HybridRetriever, RecentFilesRetriever, RetrievalRequest, RetrievalResult,
    Retriever, SemanticRetriever, SymbolRetriever,
};
use crate::symbols::SymbolIndex;
use crate::vectordb::EmbeddingIndex;
use crate::watch::IndexWatcher;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

const STATUS_FILE: &str = "status.json";

pub struct Engine {
    config: Config,
    filter: Arc<dyn FileFilter>,
    manager: Arc<IndexManager>,
    hybrid: Arc<HybridRetriever>,
}

impl Engine {
    /// Open every store under `config.data_dir` with the configured embedding provider
    pub async fn open(config: &Config) -> Result<Self> {
        config.validate()?;
        let provider = provider_from_config(&config.embedding)?;
        Self::open_with_provider(config, provider).await
    }

    pub async fn open_with_provider(config: &Config, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        config.validate()?;
        let data_dir = config.data_dir()?;
        let indexing = &config.indexing;
        let chunker = Arc::new(Chunker::new(&config.chunking));
        let filter: Arc<dyn FileFilter> = Arc::new(DefaultFileFilter::new(indexing.max_file_size));

        let fts_dir = data_dir.join("fts");
        let symbols_dir = data_dir.join("symbols");
        let embeddings_dir = data_dir.join("embeddings");
        for dir in [&fts_dir, &symbols_dir, &embeddings_dir] {
            std::fs::create_dir_all(dir)?;
        }

        let fts: Arc<dyn Index> = Arc::new(FullTextIndex::open(
            &fts_dir,
            Arc::clone(&chunker),
            indexing.commit_interval,
        )?);
        let symbols: Arc<dyn Index> = Arc::new(SymbolIndex::open(
            &symbols_dir,
            Arc::new(TreeSitterParser::new()),
            indexing.map_size_bytes(),
            indexing.commit_interval,
        )?);
        let embeddings: Arc<dyn Index> = Arc::new(EmbeddingIndex::open(
            &embeddings_dir,
            chunker,
            provider,
            indexing.map_size_bytes(),
            config.embedding.batch_size,
        )?);

        let manager = Arc::new(
            IndexManager::new(Arc::clone(&filter), indexing).with_status_file(data_dir.join(STATUS_FILE))?,
        );
        for index in [&fts, &symbols, &embeddings] {
            manager.register(Arc::clone(index)).await;
        }

        let retrieval = &config.retrieval;
        let mut hybrid = HybridRetriever::new()
            .with_retriever(Arc::new(FtsRetriever::new(fts)))
            .with_retriever(Arc::new(SymbolRetriever::new(symbols)))
            .with_retriever(Arc::new(
                SemanticRetriever::new(embeddings).with_min_query_length(retrieval.semantic_min_query_length),
            ))
            .with_retriever(Arc::new(
                RecentFilesRetriever::new(Arc::clone(&filter)).respect_gitignore(indexing.respect_gitignore),
            ))
            .with_manager(Arc::clone(&manager));
        if retrieval.rerank {
            hybrid = hybrid.with_reranker(Arc::new(HeuristicReranker::new()));
        }

        info!("Opened index stores in {}", data_dir.display());
        Ok(Self {
            config: config.clone(),
            filter,
            manager,
            hybrid: Arc::new(hybrid),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn manager(&self) -> &Arc<IndexManager> {
        &self.manager
    }

    pub fn hybrid(&self) -> &Arc<HybridRetriever> {
        &self.hybrid
    }

    pub async fn index(&self, cancel: &CancellationToken, working_dir: &Path) -> Result<IndexStatus> {
        self.manager.build_index(cancel, working_dir).await
    }

    /// Hybrid query; `max_results` falls back to the configured default
    pub async fn search(
        &self,
        cancel: &CancellationToken,
        query: &str,
        working_dir: &Path,
        max_results: Option<usize>,
    ) -> Result<RetrievalResult> {
        let working_dir = crate::index::normalize_path(working_dir);
        let request = RetrievalRequest::new(query, working_dir)
            .with_max_results(max_results.unwrap_or(self.config.retrieval.max_results));
        self.hybrid.retrieve(cancel, &request).await
    }

    pub fn watcher(&self) -> IndexWatcher {
        IndexWatcher::new(
            Arc::clone(&self.manager),
            Arc::clone(&self.filter),
            Duration::from_millis(self.config.indexing.watch_debounce_ms),
        )
    }

    pub async fn close(&self) -> Result<()> {
        self.manager.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;
    use crate::error::IndexError;
    use tempfile::tempdir;

    fn config(data_dir: &Path) -> Config {
        let mut config = Config::default();
        config.data_dir = data_dir.to_path_buf();
        config.embedding.provider = ProviderKind::Hashing;
        config.embedding.dimensions = 64;
        config.indexing.map_size_mb = 16;
        config
    }

    #[tokio::test]
    async fn test_registers_indexes_in_order() {
        let data = tempdir().unwrap();
        let engine = Engine::open(&config(data.path())).await.unwrap();
        let names: Vec<String> = engine
            .manager()
            .indexes()
            .await
            .iter()
            .map(|i| i.name().to_string())
            .collect();
        assert_eq!(names, vec!["fts", "symbols", "embeddings"]);
        assert_eq!(engine.hybrid().retrievers().len(), 4);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_at_open() {
        let data = tempdir().unwrap();
        let mut config = config(data.path());
        config.embedding.batch_size = 0;
        assert!(matches!(Engine::open(&config).await, Err(IndexError::Config(_))));
    }

    #[tokio::test]
    async fn test_search_before_index_is_not_ready() {
        let data = tempdir().unwrap();
        let work = tempdir().unwrap();
        let engine = Engine::open(&config(data.path())).await.unwrap();
        let err = engine
            .search(&CancellationToken::new(), "main", work.path(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::NotReady(_)));
    }
}
