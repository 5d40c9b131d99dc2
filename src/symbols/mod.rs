//! Symbol index: declarations extracted by the parser, matched by name.

mod store;

pub use store::{SymbolRecord, SymbolStore};

use crate::error::{IndexError, Result};
use crate::index::{
    finish_batch, is_wildcard, path_key, read_source, Index, IndexChanges, IndexStats, IndexTag,
    SearchOptions, SearchResult, SearchType,
};
use crate::parser::{SymbolInfo, SymbolKind, SymbolParser};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const VERSION: &str = "symbols-1";

const EXACT_MATCH: f32 = 100.0;
const PREFIX_MATCH: f32 = 50.0;
const SUBSTRING_MATCH: f32 = 25.0;
const SIGNATURE_MATCH: f32 = 10.0;

fn kind_bonus(kind: SymbolKind) -> f32 {
    match kind {
        SymbolKind::Function | SymbolKind::Method => 15.0,
        SymbolKind::Class | SymbolKind::Struct | SymbolKind::Interface => 10.0,
        SymbolKind::Variable | SymbolKind::Constant => 5.0,
        _ => 0.0,
    }
}

/// Case-insensitive relevance of `symbol` for an already lowercased query
///
/// `None` when neither the name nor the signature contains the query.
pub fn relevance(symbol: &SymbolInfo, query: &str) -> Option<f32> {
    if query.is_empty() {
        return None;
    }
    let name = symbol.name.to_lowercase();
    let name_score = if name == query {
        EXACT_MATCH
    } else if name.starts_with(query) {
        PREFIX_MATCH
    } else if name.contains(query) {
        SUBSTRING_MATCH
    } else {
        0.0
    };
    let signature_score = match &symbol.signature {
        Some(sig) if sig.to_lowercase().contains(query) => SIGNATURE_MATCH,
        _ => 0.0,
    };

    if name_score == 0.0 && signature_score == 0.0 {
        return None;
    }
    Some(name_score + signature_score + kind_bonus(symbol.kind))
}

/// Declarations of every parsed file, stored in LMDB
pub struct SymbolIndex {
    store: SymbolStore,
    parser: Arc<dyn SymbolParser>,
    commit_interval: usize,
}

impl SymbolIndex {
    pub const NAME: &'static str = "symbols";

    pub fn open(
        dir: &Path,
        parser: Arc<dyn SymbolParser>,
        map_size: usize,
        commit_interval: usize,
    ) -> Result<Self> {
        let store = SymbolStore::open(dir, map_size, VERSION)?;
        info!("Opened symbol index at {}", dir.display());
        Ok(Self {
            store,
            parser,
            commit_interval: commit_interval.max(1),
        })
    }
}

#[async_trait]
impl Index for SymbolIndex {
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
        let store = self.store.clone();
        let parser = Arc::clone(&self.parser);
        let cancel = cancel.clone();
        let working_dir = tag.working_dir_key();
        let upserts: Vec<PathBuf> = changes.upserts().cloned().collect();
        let deleted: Vec<String> = changes.deleted.iter().map(|p| path_key(p)).collect();
        let commit_interval = self.commit_interval;

        tokio::task::spawn_blocking(move || {
            store.delete_files(&working_dir, &deleted)?;

            let mut failed = Vec::new();
            let mut batch: Vec<(String, Vec<SymbolInfo>)> = Vec::with_capacity(commit_interval);

            for path in &upserts {
                if cancel.is_cancelled() {
                    store.replace_files(&working_dir, &batch)?;
                    return Err(IndexError::Cancelled);
                }

                let content = match read_source(path) {
                    Ok(content) => content,
                    Err(e) => {
                        warn!("Skipping {} for symbol index: {}", path.display(), e);
                        failed.push((path.clone(), e));
                        continue;
                    }
                };
                let parsed = parser.parse_file(path, &content);
                if !parsed.errors.is_empty() {
                    debug!(
                        "{}: {} syntax error(s), first: {}",
                        path.display(),
                        parsed.errors.len(),
                        parsed.errors[0]
                    );
                }
                batch.push((path_key(path), parsed.symbols));

                if batch.len() >= commit_interval {
                    store.replace_files(&working_dir, &batch)?;
                    batch.clear();
                }
            }

            store.replace_files(&working_dir, &batch)?;
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
        debug!("Removed {} symbol(s)", removed);
        Ok(())
    }

    async fn indexed_files(&self, working_dir: &str) -> Result<HashSet<String>> {
        let store = self.store.clone();
        let working_dir = working_dir.to_string();
        tokio::task::spawn_blocking(move || {
            let mut files = HashSet::new();
            store.for_each(&working_dir, |symbol| {
                files.insert(symbol.file_path);
            })?;
            Ok::<_, IndexError>(files)
        })
        .await?
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() || options.max_results == 0 {
            return Ok(Vec::new());
        }

        let store = self.store.clone();
        let working_dir = options.working_dir_key();
        let filters = options.clone();

        let mut scored = tokio::task::spawn_blocking(move || {
            let mut scored = Vec::new();
            store.for_each(&working_dir, |symbol| {
                if !filters.accepts(&symbol.file_path, symbol.language) {
                    return;
                }
                if let Some(score) = relevance(&symbol, &needle) {
                    scored.push((score, symbol));
                }
            })?;
            Ok::<_, IndexError>(scored)
        })
        .await??;

        scored.sort_by(|(a, sa), (b, sb)| {
            b.partial_cmp(a)
                .unwrap_or(Ordering::Equal)
                .then_with(|| sa.file_path.cmp(&sb.file_path))
                .then_with(|| sa.start_line.cmp(&sb.start_line))
        });
        scored.truncate(options.max_results);

        Ok(scored
            .into_iter()
            .map(|(score, symbol)| {
                let content = symbol
                    .signature
                    .clone()
                    .unwrap_or_else(|| format!("{} {}", symbol.kind, symbol.name));
                let mut result = SearchResult::new(
                    symbol.file_path.clone(),
                    symbol.start_line,
                    symbol.end_line,
                    content,
                    score,
                    SearchType::Symbol,
                )
                .with_metadata("kind", symbol.kind.as_str())
                .with_metadata("language", symbol.language.id());
                if let Some(parent) = &symbol.parent {
                    result = result.with_metadata("parent", parent.as_str());
                }
                result.column = symbol.start_column;
                result.symbol_info = Some(symbol);
                result
            })
            .collect())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let store = self.store.clone();
        let (documents, files, working_directories) =
            tokio::task::spawn_blocking(move || store.stats()).await??;
        Ok(IndexStats {
            name: Self::NAME.to_string(),
            version: VERSION.to_string(),
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
