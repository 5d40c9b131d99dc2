use crate::chunker::{Chunk, ChunkType};
use crate::embed::cosine_similarity;
use crate::error::{IndexError, Result};
use crate::file::Language;
use crate::index::lmdb;
use heed::types::{SerdeBincode, Str};
use heed::{Database, Env};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

/// Chunk metadata and vector stored per row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub chunk_id: String,
    pub working_dir: String,
    pub file_path: String,
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub chunk_type: ChunkType,
    pub language: Language,
    pub content_hash: String,
    pub embedding: Vec<f32>,
}

impl EmbeddingRecord {
    pub fn from_chunk(working_dir: &str, chunk: &Chunk, embedding: Vec<f32>) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            working_dir: working_dir.to_string(),
            file_path: chunk.file_path.clone(),
            content: chunk.content.clone(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            chunk_type: chunk.chunk_type,
            language: chunk.language,
            content_hash: chunk.content_hash.clone(),
            embedding,
        }
    }
}

/// Vector database on heed (LMDB) with exact cosine search
///
/// Every stored vector of the working directory is scored, in parallel.
#[derive(Clone)]
pub struct VectorStore {
    env: Env,
    chunks: Database<Str, SerdeBincode<EmbeddingRecord>>,
    dimensions: usize,
}

impl VectorStore {
    /// Create or open a vector store, clearing rows written by a different `version`
    pub fn open(dir: &Path, map_size: usize, dimensions: usize, version: &str) -> Result<Self> {
        let env = lmdb::open_env(dir, map_size, 2)?;
        let mut wtxn = env.write_txn()?;
        let chunks: Database<Str, SerdeBincode<EmbeddingRecord>> =
            env.create_database(&mut wtxn, Some("chunks"))?;
        let meta: Database<Str, Str> = env.create_database(&mut wtxn, Some("meta"))?;
        if lmdb::check_version(meta, &mut wtxn, version)? {
            warn!(
                "Vector store at {} was built with another model, clearing",
                dir.display()
            );
            chunks.clear(&mut wtxn)?;
        }
        wtxn.commit()?;

        Ok(Self {
            env,
            chunks,
            dimensions,
        })
    }

    /// Replace all rows of one file in a single transaction
    pub fn replace_file(&self, working_dir: &str, file_path: &str, records: &[EmbeddingRecord]) -> Result<usize> {
        for record in records {
            if record.embedding.len() != self.dimensions {
                return Err(IndexError::Embedding(format!(
                    "embedding dimension mismatch: expected {}, got {}",
                    self.dimensions,
                    record.embedding.len()
                )));
            }
        }

        let mut wtxn = self.env.write_txn()?;
        lmdb::delete_prefix(self.chunks, &mut wtxn, &lmdb::file_prefix(working_dir, file_path))?;
        for (seq, record) in records.iter().enumerate() {
            self.chunks
                .put(&mut wtxn, &lmdb::row_key(working_dir, file_path, seq), record)?;
        }
        wtxn.commit()?;
        Ok(records.len())
    }

    pub fn delete_files(&self, working_dir: &str, file_paths: &[String]) -> Result<usize> {
        let mut wtxn = self.env.write_txn()?;
        let mut deleted = 0;
        for file_path in file_paths {
            deleted += lmdb::delete_prefix(self.chunks, &mut wtxn, &lmdb::file_prefix(working_dir, file_path))?;
        }
        wtxn.commit()?;
        Ok(deleted)
    }

    pub fn delete_working_dir(&self, working_dir: &str) -> Result<usize> {
        let mut wtxn = self.env.write_txn()?;
        let deleted = lmdb::delete_prefix(self.chunks, &mut wtxn, &lmdb::dir_prefix(working_dir))?;
        wtxn.commit()?;
        Ok(deleted)
    }

    /// Distinct file paths stored for one working directory
    pub fn files(&self, working_dir: &str) -> Result<HashSet<String>> {
        let rtxn = self.env.read_txn()?;
        let mut files = HashSet::new();
        for row in self.chunks.prefix_iter(&rtxn, &lmdb::dir_prefix(working_dir))? {
            let (_, record) = row?;
            if record.working_dir == working_dir {
                files.insert(record.file_path);
            }
        }
        Ok(files)
    }

    /// Top `limit` rows of `working_dir` by cosine similarity to `query`
    pub fn search<F>(
        &self,
        working_dir: &str,
        query: &[f32],
        limit: usize,
        accept: F,
    ) -> Result<Vec<(f32, EmbeddingRecord)>>
    where
        F: Fn(&EmbeddingRecord) -> bool + Sync,
    {
        if limit == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimensions {
            // Every row scores 0 against a query of the wrong size
            warn!(
                "Query vector has {} dimensions, store has {}",
                query.len(),
                self.dimensions
            );
        }

        let candidates = {
            let rtxn = self.env.read_txn()?;
            let mut candidates = Vec::new();
            for row in self.chunks.prefix_iter(&rtxn, &lmdb::dir_prefix(working_dir))? {
                let (_, record) = row?;
                if record.working_dir == working_dir && accept(&record) {
                    candidates.push(record);
                }
            }
            candidates
        };

        let mut scored: Vec<(f32, EmbeddingRecord)> = candidates
            .into_par_iter()
            .map(|record| (cosine_similarity(query, &record.embedding), record))
            .collect();

        scored.sort_by(|(a, ra), (b, rb)| {
            b.partial_cmp(a)
                .unwrap_or(Ordering::Equal)
                .then_with(|| ra.file_path.cmp(&rb.file_path))
                .then_with(|| ra.start_line.cmp(&rb.start_line))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    /// (chunks, files, working directories)
    pub fn stats(&self) -> Result<(u64, u64, u64)> {
        let rtxn = self.env.read_txn()?;
        lmdb::key_stats(self.chunks, &rtxn)
    }

    pub fn sync(&self) -> Result<()> {
        self.env.force_sync()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(file: &str, line: usize, embedding: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            chunk_id: format!("{}:{}", file, line),
            working_dir: "/w".to_string(),
            file_path: file.to_string(),
            content: format!("content of {}", file),
            start_line: line,
            end_line: line,
            chunk_type: ChunkType::Code,
            language: Language::Rust,
            content_hash: String::new(),
            embedding,
        }
    }

    #[test]
    fn test_search_orders_by_similarity() -> Result<()> {
        let dir = tempdir()?;
        let store = VectorStore::open(dir.path(), 10 * 1024 * 1024, 2, "v1")?;
        store.replace_file("/w", "/w/a.rs", &[record("/w/a.rs", 1, vec![1.0, 0.0])])?;
        store.replace_file("/w", "/w/b.rs", &[record("/w/b.rs", 1, vec![0.6, 0.8])])?;
        store.replace_file("/w", "/w/c.rs", &[record("/w/c.rs", 1, vec![0.0, 1.0])])?;

        let hits = store.search("/w", &[1.0, 0.0], 2, |_| true)?;
        let files: Vec<&str> = hits.iter().map(|(_, r)| r.file_path.as_str()).collect();
        assert_eq!(files, vec!["/w/a.rs", "/w/b.rs"]);
        assert!((hits[0].0 - 1.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_dimension_mismatch() -> Result<()> {
        let dir = tempdir()?;
        let store = VectorStore::open(dir.path(), 10 * 1024 * 1024, 3, "v1")?;
        assert!(store
            .replace_file("/w", "/w/a.rs", &[record("/w/a.rs", 1, vec![1.0, 0.0])])
            .is_err());
        store.replace_file("/w", "/w/b.rs", &[record("/w/b.rs", 1, vec![1.0, 0.0, 0.0])])?;

        // A short query is not an error, it just matches nothing
        let hits = store.search("/w", &[1.0], 5, |_| true)?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 0.0);
        Ok(())
    }

    #[test]
    fn test_replace_and_delete() -> Result<()> {
        let dir = tempdir()?;
        let store = VectorStore::open(dir.path(), 10 * 1024 * 1024, 2, "v1")?;
        store.replace_file(
            "/w",
            "/w/a.rs",
            &[record("/w/a.rs", 1, vec![1.0, 0.0]), record("/w/a.rs", 9, vec![0.0, 1.0])],
        )?;
        store.replace_file("/w", "/w/a.rs", &[record("/w/a.rs", 1, vec![1.0, 0.0])])?;
        assert_eq!(store.stats()?, (1, 1, 1));

        store.delete_files("/w", &["/w/a.rs".to_string()])?;
        assert!(store.search("/w", &[1.0, 0.0], 5, |_| true)?.is_empty());
        Ok(())
    }
}
