//! The `Index` abstraction shared by the full-text, symbol and embedding stores.

pub(crate) mod lmdb;
mod manager;
mod status;
mod tag;

pub use manager::{normalize_path, IndexManager};
pub use status::IndexStatus;
pub use tag::IndexTag;

use crate::error::{IndexError, Result};
use crate::file::Language;
use crate::parser::SymbolInfo;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Path accepted by [`Index::remove`] meaning "every file of the working directory"
pub const WILDCARD: &str = "*";

/// Snippets are cut to this many characters
const SNIPPET_CHARS: usize = 200;

/// A persisted, incrementally updatable index over the files of working directories
#[async_trait]
pub trait Index: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Replace all units of every added/modified file and drop deleted files
    ///
    /// Per-file failures do not abort the batch; they come back as
    /// [`IndexError::PartialUpdate`] after the rest is committed.
    async fn update(
        &self,
        cancel: &CancellationToken,
        tag: &IndexTag,
        changes: &IndexChanges,
    ) -> Result<()>;

    /// Drop the given files, or everything under the working directory for [`WILDCARD`]
    async fn remove(&self, cancel: &CancellationToken, tag: &IndexTag, files: &[PathBuf])
        -> Result<()>;

    /// Files of `working_dir` that currently have rows in this index
    ///
    /// A rebuild removes the ones no longer on disk. Indexes that cannot
    /// enumerate their files return an empty set.
    async fn indexed_files(&self, _working_dir: &str) -> Result<HashSet<String>> {
        Ok(HashSet::new())
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>>;

    async fn stats(&self) -> Result<IndexStats>;

    async fn close(&self) -> Result<()>;
}

/// File-level changes for one update; the three sets are kept disjoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexChanges {
    pub added: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
}

impl IndexChanges {
    pub fn new(added: Vec<PathBuf>, modified: Vec<PathBuf>, deleted: Vec<PathBuf>) -> Self {
        let mut changes = Self {
            added,
            modified,
            deleted,
        };
        changes.normalize();
        changes
    }

    pub fn added(paths: Vec<PathBuf>) -> Self {
        Self::new(paths, Vec::new(), Vec::new())
    }

    /// Deduplicate; a deleted path wins over added/modified, modified wins over added
    pub fn normalize(&mut self) {
        let deleted: BTreeSet<PathBuf> = self.deleted.drain(..).collect();
        let modified: BTreeSet<PathBuf> = self
            .modified
            .drain(..)
            .filter(|p| !deleted.contains(p))
            .collect();
        let added: BTreeSet<PathBuf> = self
            .added
            .drain(..)
            .filter(|p| !deleted.contains(p) && !modified.contains(p))
            .collect();

        self.added = added.into_iter().collect();
        self.modified = modified.into_iter().collect();
        self.deleted = deleted.into_iter().collect();
    }

    /// Files whose content must be (re)indexed
    pub fn upserts(&self) -> impl Iterator<Item = &PathBuf> {
        self.added.iter().chain(self.modified.iter())
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which retrieval strategy produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    FullText,
    Symbol,
    Semantic,
    RecentFiles,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::FullText => "full_text",
            SearchType::Symbol => "symbol",
            SearchType::Semantic => "semantic",
            SearchType::RecentFiles => "recent_files",
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub working_directory: PathBuf,
    pub max_results: usize,
    /// Restrict to these languages; empty means all
    pub languages: Vec<Language>,
    /// Restrict to these file extensions (without the dot); empty means all
    pub extensions: Vec<String>,
}

impl SearchOptions {
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self {
            working_directory: working_directory.into(),
            max_results: 20,
            languages: Vec::new(),
            extensions: Vec::new(),
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_languages(mut self, languages: Vec<Language>) -> Self {
        self.languages = languages;
        self
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    /// Apply the language and extension filters to a stored file
    pub fn accepts(&self, file_path: &str, language: Language) -> bool {
        if !self.languages.is_empty() && !self.languages.contains(&language) {
            return false;
        }
        if self.extensions.is_empty() {
            return true;
        }
        Path::new(file_path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.contains(&e.to_lowercase()))
            .unwrap_or(false)
    }

    pub fn working_dir_key(&self) -> String {
        self.working_directory.to_string_lossy().into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub file_path: String,
    /// 1-based line where the match starts
    pub line_number: usize,
    pub column: usize,
    pub end_line: usize,
    pub content: String,
    pub snippet: String,
    pub score: f32,
    pub search_type: SearchType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_info: Option<SymbolInfo>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl SearchResult {
    pub fn new(
        file_path: impl Into<String>,
        line_number: usize,
        end_line: usize,
        content: impl Into<String>,
        score: f32,
        search_type: SearchType,
    ) -> Self {
        let content = content.into();
        Self {
            file_path: file_path.into(),
            line_number,
            column: 1,
            end_line,
            snippet: make_snippet(&content),
            content,
            score,
            search_type,
            symbol_info: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Dedup key used when merging results of several retrievers
    pub fn location(&self) -> (&str, usize) {
        (&self.file_path, self.line_number)
    }
}

/// First lines of `content`, cut on a char boundary
pub fn make_snippet(content: &str) -> String {
    let trimmed = content.trim_start_matches('\n');
    if trimmed.chars().count() <= SNIPPET_CHARS {
        return trimmed.trim_end().to_string();
    }
    let cut: String = trimmed.chars().take(SNIPPET_CHARS).collect();
    match cut.rfind('\n') {
        Some(pos) if pos > 0 => cut[..pos].to_string(),
        _ => cut,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub name: String,
    pub version: String,
    pub documents: u64,
    pub files: u64,
    pub working_directories: u64,
}

/// Read a file for indexing; non-UTF-8 content is a per-file error
pub(crate) fn read_source(path: &Path) -> std::result::Result<String, String> {
    let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
    String::from_utf8(bytes).map_err(|_| "not valid UTF-8".to_string())
}

/// Turn collected per-file failures into the batch outcome
pub(crate) fn finish_batch(index: &str, failed: Vec<(PathBuf, String)>) -> Result<()> {
    if failed.is_empty() {
        Ok(())
    } else {
        Err(IndexError::PartialUpdate {
            index: index.to_string(),
            failed,
        })
    }
}

pub(crate) fn is_wildcard(files: &[PathBuf]) -> bool {
    files.iter().any(|f| f.as_os_str() == WILDCARD)
}

pub(crate) fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
