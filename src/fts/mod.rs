//! Full-text chunk index.

mod tantivy_store;

pub use tantivy_store::{FtsHit, FtsStats, FtsStore};

use crate::chunker::Chunker;
use crate::error::{IndexError, Result};
use crate::index::{
    finish_batch, is_wildcard, path_key, read_source, Index, IndexChanges, IndexStats, IndexTag,
    SearchOptions, SearchResult, SearchType,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const VERSION: &str = "fts-1";

/// Map a negated-BM25 rank (more negative is better) into `[0, 1]`
pub fn normalize_rank(rank: f64) -> f64 {
    if rank >= 0.0 {
        0.0
    } else {
        -rank / (1.0 - rank)
    }
}

/// Split a free-text query into lowercase word terms
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// BM25 over chunk content, one tantivy document per chunk
pub struct FullTextIndex {
    store: Arc<FtsStore>,
    chunker: Arc<Chunker>,
    commit_interval: usize,
}

impl FullTextIndex {
    pub const NAME: &'static str = "fts";

    /// Open the store under `dir`, rebuilding it when its version is stale
    pub fn open(dir: &Path, chunker: Arc<Chunker>, commit_interval: usize) -> Result<Self> {
        let version_file = dir.join("VERSION");
        if dir.join("meta.json").exists() {
            let stored = std::fs::read_to_string(&version_file).unwrap_or_default();
            if stored.trim() != VERSION {
                warn!(
                    "Full-text store at {} has version {:?}, rebuilding",
                    dir.display(),
                    stored.trim()
                );
                std::fs::remove_dir_all(dir)?;
            }
        }
        std::fs::create_dir_all(dir)?;
        std::fs::write(&version_file, VERSION)?;

        let store = FtsStore::open(dir)?;
        info!("Opened full-text index at {}", dir.display());
        Ok(Self {
            store: Arc::new(store),
            chunker,
            commit_interval: commit_interval.max(1),
        })
    }
}

#[async_trait]
impl Index for FullTextIndex {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> &str {
        VERSION
    }

    async fn update(
        &self,
        cancel: &CancellationToken,
        tag: &IndexTag,
        changes: &IndexChanges,
    ) -> Result<()> {
        let store = Arc::clone(&self.store);
        let chunker = Arc::clone(&self.chunker);
        let cancel = cancel.clone();
        let working_dir = tag.working_dir_key();
        let upserts: Vec<PathBuf> = changes.upserts().cloned().collect();
        let deleted = changes.deleted.clone();
        let commit_interval = self.commit_interval;

        tokio::task::spawn_blocking(move || {
            let mut failed = Vec::new();
            let mut pending = 0usize;
            let indexed_at = Utc::now().timestamp();

            for path in &deleted {
                store.delete_file(&working_dir, &path_key(path))?;
            }

            for path in &upserts {
                if cancel.is_cancelled() {
                    store.commit()?;
                    return Err(IndexError::Cancelled);
                }

                let content = match read_source(path) {
                    Ok(content) => content,
                    Err(e) => {
                        warn!("Skipping {} for full-text index: {}", path.display(), e);
                        failed.push((path.clone(), e));
                        continue;
                    }
                };
                let file_path = path_key(path);
                let chunks = chunker.chunk_file(path, &content);
                debug!("{}: {} chunks", file_path, chunks.len());
                store.replace_file(&working_dir, &file_path, &chunks, content.len() as u64, indexed_at)?;

                pending += 1;
                if pending >= commit_interval {
                    store.commit()?;
                    pending = 0;
                }
            }

            store.commit()?;
            finish_batch(Self::NAME, failed)
        })
        .await?
    }

    async fn remove(
        &self,
        _cancel: &CancellationToken,
        tag: &IndexTag,
        files: &[PathBuf],
    ) -> Result<()> {
        let store = Arc::clone(&self.store);
        let working_dir = tag.working_dir_key();
        let files = files.to_vec();

        tokio::task::spawn_blocking(move || {
            if is_wildcard(&files) {
                store.delete_working_dir(&working_dir)?;
            } else {
                for path in &files {
                    store.delete_file(&working_dir, &path_key(path))?;
                }
            }
            store.commit()
        })
        .await?
    }

    async fn indexed_files(&self, working_dir: &str) -> Result<HashSet<String>> {
        let store = Arc::clone(&self.store);
        let working_dir = working_dir.to_string();
        tokio::task::spawn_blocking(move || store.files(&working_dir)).await?
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let terms = query_terms(query);
        if terms.is_empty() || options.max_results == 0 {
            return Ok(Vec::new());
        }

        let store = Arc::clone(&self.store);
        let working_dir = options.working_dir_key();
        let languages = options.languages.clone();
        // Extension filtering happens after retrieval
        let fetch = if options.extensions.is_empty() {
            options.max_results
        } else {
            options.max_results * 4
        };

        let hits = tokio::task::spawn_blocking(move || {
            store.search(&working_dir, &terms, &languages, fetch)
        })
        .await??;

        Ok(hits
            .into_iter()
            .filter(|hit| options.accepts(&hit.file_path, hit.language))
            .take(options.max_results)
            .map(|hit| {
                let rank = -(hit.bm25 as f64);
                SearchResult::new(
                    hit.file_path,
                    hit.start_line,
                    hit.end_line,
                    hit.content,
                    normalize_rank(rank) as f32,
                    SearchType::FullText,
                )
                .with_metadata("chunk_id", hit.chunk_id)
                .with_metadata("rank", rank)
                .with_metadata("language", hit.language.id())
                .with_metadata("chunk_type", hit.chunk_type.as_str())
                .with_metadata("start_byte", hit.start_byte)
                .with_metadata("end_byte", hit.end_byte)
            })
            .collect())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let store = Arc::clone(&self.store);
        let stats = tokio::task::spawn_blocking(move || store.stats()).await??;
        Ok(IndexStats {
            name: Self::NAME.to_string(),
            version: VERSION.to_string(),
            documents: stats.num_documents,
            files: stats.num_files,
            working_directories: stats.num_working_dirs,
        })
    }

    async fn close(&self) -> Result<()> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            store.commit()?;
            store.close()
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_normalize_rank() {
        assert_eq!(normalize_rank(0.0), 0.0);
        assert_eq!(normalize_rank(3.0), 0.0);
        assert!((normalize_rank(-1.0) - 0.5).abs() < 1e-9);
        assert!(normalize_rank(-10.0) > normalize_rank(-1.0));
        assert!(normalize_rank(-1e9) < 1.0);
    }

    #[test]
    fn test_query_terms() {
        assert_eq!(query_terms("func main"), vec!["func", "main"]);
        assert_eq!(query_terms("load_config(path)"), vec!["load", "config", "path"]);
        assert!(query_terms("  ::  ").is_empty());
    }

    async fn index_with(files: &[(&str, &str)]) -> (tempfile::TempDir, tempfile::TempDir, FullTextIndex, IndexTag) {
        let work = tempdir().unwrap();
        let data = tempdir().unwrap();
        let mut paths = Vec::new();
        for (name, content) in files {
            let path = work.path().join(name);
            std::fs::write(&path, content).unwrap();
            paths.push(path);
        }
        let index = FullTextIndex::open(&data.path().join("fts"), Arc::new(Chunker::default()), 1).unwrap();
        let tag = IndexTag::new(work.path());
        index
            .update(&CancellationToken::new(), &tag, &IndexChanges::added(paths))
            .await
            .unwrap();
        (work, data, index, tag)
    }

    #[tokio::test]
    async fn test_update_and_search_scores_in_unit_range() {
        let (work, _data, index, _tag) = index_with(&[
            ("main.go", "package main\n\nfunc main() {\n\tprintln(\"hi\")\n}\n"),
            ("README.md", "# Demo\n\nThis project prints a greeting.\n"),
        ])
        .await;

        let opts = SearchOptions::new(work.path());
        let results = index.search("func main", &opts).await.unwrap();
        assert!(!results.is_empty());
        assert!(results[0].file_path.ends_with("main.go"));
        for r in &results {
            assert!((0.0..=1.0).contains(&r.score), "score {}", r.score);
            assert_eq!(r.search_type, SearchType::FullText);
        }
    }

    #[tokio::test]
    async fn test_reindex_replaces_and_remove_clears() {
        let (work, _data, index, tag) = index_with(&[("notes.txt", "first version of the notes\n")]).await;
        let path = work.path().join("notes.txt");
        let opts = SearchOptions::new(work.path());

        std::fs::write(&path, "second revision of the notes\n").unwrap();
        let changes = IndexChanges::new(Vec::new(), vec![path.clone()], Vec::new());
        index.update(&CancellationToken::new(), &tag, &changes).await.unwrap();
        assert!(index.search("first", &opts).await.unwrap().is_empty());
        assert_eq!(index.search("second", &opts).await.unwrap().len(), 1);

        let stats = index.stats().await.unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.version, VERSION);

        index
            .remove(&CancellationToken::new(), &tag, &[PathBuf::from(crate::index::WILDCARD)])
            .await
            .unwrap();
        assert!(index.search("notes", &opts).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_file_is_partial_failure() {
        let work = tempdir().unwrap();
        let data = tempdir().unwrap();
        let good = work.path().join("good.txt");
        std::fs::write(&good, "readable words here\n").unwrap();
        let missing = work.path().join("missing.txt");

        let index = FullTextIndex::open(data.path(), Arc::new(Chunker::default()), 8).unwrap();
        let tag = IndexTag::new(work.path());
        let err = index
            .update(
                &CancellationToken::new(),
                &tag,
                &IndexChanges::added(vec![good, missing.clone()]),
            )
            .await
            .unwrap_err();

        match err {
            IndexError::PartialUpdate { index, failed } => {
                assert_eq!(index, "fts");
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].0, missing);
            }
            other => panic!("unexpected error {other}"),
        }
        let opts = SearchOptions::new(work.path());
        assert_eq!(index.search("readable", &opts).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_update() {
        let work = tempdir().unwrap();
        let data = tempdir().unwrap();
        let path = work.path().join("a.txt");
        std::fs::write(&path, "some words here\n").unwrap();
        let index = FullTextIndex::open(data.path(), Arc::new(Chunker::default()), 8).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = index
            .update(&cancel, &IndexTag::new(work.path()), &IndexChanges::added(vec![path]))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
