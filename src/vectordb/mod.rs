//! Embedding index: one vector per chunk, searched by cosine similarity.

mod store;

pub use store::{EmbeddingRecord, VectorStore};

use crate::chunker::{Chunk, Chunker};
use crate::embed::EmbeddingProvider;
use crate::error::{IndexError, Result};
use crate::index::{
    finish_batch, is_wildcard, path_key, read_source, Index, IndexChanges, IndexStats, IndexTag,
    SearchOptions, SearchResult, SearchType,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Similarity is reported on a 0-100 scale
const SCORE_SCALE: f32 = 100.0;

/// Provider batches buffered before a group of files is embedded and committed
const GROUP_BATCHES: usize = 16;

pub struct EmbeddingIndex {
    store: VectorStore,
    chunker: Arc<Chunker>,
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    version: String,
}

impl EmbeddingIndex {
    pub const NAME: &'static str = "embeddings";

    pub fn open(
        dir: &Path,
        chunker: Arc<Chunker>,
        provider: Arc<dyn EmbeddingProvider>,
        map_size: usize,
        batch_size: usize,
    ) -> Result<Self> {
        // Vectors from different models are not comparable
        let version = format!("embeddings-1:{}:{}", provider.model_name(), provider.dimensions());
        let store = VectorStore::open(dir, map_size, provider.dimensions(), &version)?;
        info!(
            "Opened embedding index at {} ({}, {} dims)",
            dir.display(),
            provider.model_name(),
            provider.dimensions()
        );
        Ok(Self {
            store,
            chunker,
            provider,
            batch_size: batch_size.max(1),
            version,
        })
    }

    /// One provider call; the output count must match the input
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let embeddings = self.provider.generate_batch_embeddings(texts).await?;
        if embeddings.len() != texts.len() {
            return Err(IndexError::Embedding(format!(
                "provider returned {} embeddings for {} chunks",
                embeddings.len(),
                texts.len()
            )));
        }
        Ok(embeddings)
    }

    /// Embed a group of files in `batch_size` calls that cross file
    /// boundaries, then commit each file in its own transaction
    ///
    /// A failed batch fails every file with a chunk in it.
    async fn flush_group(
        &self,
        cancel: &CancellationToken,
        working_dir: &str,
        group: Vec<PendingFile>,
        failed: &mut Vec<(PathBuf, String)>,
    ) -> Result<()> {
        let mut vectors: Vec<Vec<Vec<f32>>> = group.iter().map(|f| Vec::with_capacity(f.chunks.len())).collect();
        let mut errors: Vec<Option<String>> = vec![None; group.len()];

        let flat: Vec<(usize, &Chunk)> = group
            .iter()
            .enumerate()
            .flat_map(|(file, pending)| pending.chunks.iter().map(move |chunk| (file, chunk)))
            .collect();
        for batch in flat.chunks(self.batch_size) {
            if cancel.is_cancelled() {
                return Err(IndexError::Cancelled);
            }
            let texts: Vec<String> = batch.iter().map(|(_, chunk)| chunk.content.clone()).collect();
            match self.embed_batch(&texts).await {
                Ok(embeddings) => {
                    for ((file, _), embedding) in batch.iter().zip(embeddings) {
                        vectors[*file].push(embedding);
                    }
                }
                Err(e) => {
                    warn!("Embedding batch of {} chunks failed: {}", batch.len(), e);
                    for (file, _) in batch {
                        errors[*file].get_or_insert_with(|| e.to_string());
                    }
                }
            }
        }

        for ((pending, vectors), error) in group.into_iter().zip(vectors).zip(errors) {
            if let Some(error) = error {
                failed.push((pending.path, error));
                continue;
            }
            let records: Vec<EmbeddingRecord> = pending
                .chunks
                .iter()
                .zip(vectors)
                .map(|(chunk, embedding)| EmbeddingRecord::from_chunk(working_dir, chunk, embedding))
                .collect();

            let store = self.store.clone();
            let dir = working_dir.to_string();
            let file_path = path_key(&pending.path);
            match tokio::task::spawn_blocking(move || store.replace_file(&dir, &file_path, &records)).await? {
                Ok(count) => debug!("{}: {} vectors", pending.path.display(), count),
                Err(e) => {
                    warn!("Skipping {} for embedding index: {}", pending.path.display(), e);
                    failed.push((pending.path, e.to_string()));
                }
            }
        }
        Ok(())
    }
}

/// A file read and chunked, waiting for its vectors
struct PendingFile {
    path: PathBuf,
    chunks: Vec<Chunk>,
}

#[async_trait]
impl Index for EmbeddingIndex {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> &str {
        &self.version
    }

    async fn update(
        &self,
        cancel: &CancellationToken,
        tag: &IndexTag,
        changes: &IndexChanges,
    ) -> Result<()> {
        let working_dir = tag.working_dir_key();

        if !changes.deleted.is_empty() {
            let store = self.store.clone();
            let dir = working_dir.clone();
            let deleted: Vec<String> = changes.deleted.iter().map(|p| path_key(p)).collect();
            tokio::task::spawn_blocking(move || store.delete_files(&dir, &deleted)).await??;
        }

        let mut failed = Vec::new();
        let group_limit = self.batch_size * GROUP_BATCHES;
        let mut group = Vec::new();
        let mut group_chunks = 0usize;
        for path in changes.upserts() {
            if cancel.is_cancelled() {
                return Err(IndexError::Cancelled);
            }
            let source_path = path.clone();
            let content = match tokio::task::spawn_blocking(move || read_source(&source_path)).await? {
                Ok(content) => content,
                Err(e) => {
                    warn!("Skipping {} for embedding index: {}", path.display(), e);
                    failed.push((path.clone(), e));
                    continue;
                }
            };
            let chunks = self.chunker.chunk_file(path, &content);
            group_chunks += chunks.len();
            group.push(PendingFile {
                path: path.clone(),
                chunks,
            });

            if group_chunks >= group_limit {
                self.flush_group(cancel, &working_dir, std::mem::take(&mut group), &mut failed)
                    .await?;
                group_chunks = 0;
            }
        }
        if !group.is_empty() {
            self.flush_group(cancel, &working_dir, group, &mut failed).await?;
        }

        finish_batch(Self::NAME, failed)
    }

    async fn remove(
        &self,
        _cancel: &CancellationToken,
        tag: &IndexTag,
        files: &[PathBuf],
    ) -> Result<()> {
        let store = self.store.clone();
        let working_dir = tag.working_dir_key();
        let wildcard = is_wildcard(files);
        let files: Vec<String> = files.iter().map(|p| path_key(p)).collect();

        let removed = tokio::task::spawn_blocking(move || {
            if wildcard {
                store.delete_working_dir(&working_dir)
            } else {
                store.delete_files(&working_dir, &files)
            }
        })
        .await??;
        debug!("Removed {} vector(s)", removed);
        Ok(())
    }

    async fn indexed_files(&self, working_dir: &str) -> Result<HashSet<String>> {
        let store = self.store.clone();
        let working_dir = working_dir.to_string();
        tokio::task::spawn_blocking(move || store.files(&working_dir)).await?
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() || options.max_results == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.provider.generate_embedding(query).await?;
        let store = self.store.clone();
        let working_dir = options.working_dir_key();
        let filters = options.clone();

        let hits = tokio::task::spawn_blocking(move || {
            store.search(&working_dir, &query_vector, filters.max_results, |record| {
                filters.accepts(&record.file_path, record.language)
            })
        })
        .await??;

        Ok(hits
            .into_iter()
            .map(|(similarity, record)| {
                SearchResult::new(
                    record.file_path,
                    record.start_line,
                    record.end_line,
                    record.content,
                    similarity * SCORE_SCALE,
                    SearchType::Semantic,
                )
                .with_metadata("chunk_id", record.chunk_id)
                .with_metadata("similarity", similarity as f64)
                .with_metadata("language", record.language.id())
                .with_metadata("chunk_type", record.chunk_type.as_str())
            })
            .collect())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let store = self.store.clone();
        let (documents, files, working_directories) =
            tokio::task::spawn_blocking(move || store.stats()).await??;
        Ok(IndexStats {
            name: Self::NAME.to_string(),
            version: self.version.clone(),
            documents,
            files,
            working_directories,
        })
    }

    async fn close(&self) -> Result<()> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.sync()).await?
    }
}
