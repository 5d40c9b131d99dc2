use crate::error::{IndexError, Result};
use ignore::{DirEntry, WalkBuilder};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod filter;
mod language;

pub use filter::{looks_binary, DefaultFileFilter, FileFilter};
pub use language::{Language, LanguageFamily};

/// Capacity of the channel between the walker thread and its consumer
const WALK_CHANNEL_CAPACITY: usize = 256;

/// Information about a discovered file
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: PathBuf,
    pub language: Language,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Statistics about walked files
#[derive(Debug, Default, Clone)]
pub struct WalkStats {
    pub total_entries: usize,
    pub indexable_files: usize,
    pub skipped_files: usize,
    pub walk_errors: usize,
    pub files_by_language: HashMap<Language, usize>,
    pub total_size_bytes: u64,
}

impl WalkStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, file: &FileInfo) {
        self.indexable_files += 1;
        self.total_size_bytes += file.size;
        *self.files_by_language.entry(file.language).or_insert(0) += 1;
    }

    pub fn total_size_mb(&self) -> f64 {
        self.total_size_bytes as f64 / (1024.0 * 1024.0)
    }

    pub fn log_summary(&self) {
        info!(
            "File discovery complete: {} indexable, {} skipped, {} errors, {:.2} MB",
            self.indexable_files,
            self.skipped_files,
            self.walk_errors,
            self.total_size_mb()
        );

        let mut langs: Vec<_> = self.files_by_language.iter().collect();
        langs.sort_by(|a, b| b.1.cmp(a.1));
        for (lang, count) in langs.iter().take(10) {
            debug!("  {}: {}", lang.name(), count);
        }
    }
}

/// File walker that respects .gitignore and .codeindexignore and prunes
/// subtrees rejected by a [`FileFilter`]
#[derive(Debug, Clone)]
pub struct FileWalker {
    root: PathBuf,
    respect_gitignore: bool,
    include_hidden: bool,
}

impl FileWalker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            respect_gitignore: true,
            include_hidden: false,
        }
    }

    /// Set whether to respect .gitignore files (default: true)
    pub fn respect_gitignore(mut self, respect: bool) -> Self {
        self.respect_gitignore = respect;
        self
    }

    /// Set whether to include hidden files (default: false)
    pub fn include_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// Walk synchronously, collecting every indexable file
    pub fn walk(&self, filter: Arc<dyn FileFilter>) -> Result<(Vec<FileInfo>, WalkStats)> {
        let mut files = Vec::new();
        let stats = self.visit(filter, &CancellationToken::new(), |file| {
            files.push(file);
            true
        })?;
        Ok((files, stats))
    }

    /// Walk on a blocking thread, streaming files through a bounded channel.
    ///
    /// The walk stops early when `cancel` fires or the receiver is dropped;
    /// the join handle then resolves to `IndexError::Cancelled` or the
    /// partial stats respectively.
    pub fn stream(
        &self,
        filter: Arc<dyn FileFilter>,
        cancel: CancellationToken,
    ) -> (mpsc::Receiver<FileInfo>, JoinHandle<Result<WalkStats>>) {
        let (tx, rx) = mpsc::channel(WALK_CHANNEL_CAPACITY);
        let walker = self.clone();

        let handle = tokio::task::spawn_blocking(move || {
            walker.visit(filter, &cancel, |file| tx.blocking_send(file).is_ok())
        });

        (rx, handle)
    }

    /// Core walk loop; `sink` returns false to stop the walk
    fn visit<F>(
        &self,
        filter: Arc<dyn FileFilter>,
        cancel: &CancellationToken,
        mut sink: F,
    ) -> Result<WalkStats>
    where
        F: FnMut(FileInfo) -> bool,
    {
        let mut stats = WalkStats::new();
        debug!("Starting file walk in: {}", self.root.display());

        let prune = filter.clone();
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .git_ignore(self.respect_gitignore)
            .git_global(self.respect_gitignore)
            .git_exclude(self.respect_gitignore)
            .require_git(false)
            .hidden(!self.include_hidden)
            .add_custom_ignore_filename(".codeindexignore")
            .filter_entry(move |entry: &DirEntry| {
                entry.depth() == 0 || !prune.should_ignore(entry.path())
            });

        for result in builder.build() {
            if cancel.is_cancelled() {
                debug!("Walk of {} cancelled", self.root.display());
                return Err(IndexError::Cancelled);
            }

            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    stats.walk_errors += 1;
                    warn!("Error walking file: {}", err);
                    continue;
                }
            };
            stats.total_entries += 1;

            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }

            let path = entry.path();
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    stats.walk_errors += 1;
                    warn!("Cannot stat {}: {}", path.display(), err);
                    continue;
                }
            };

            if !filter.should_index(path, &metadata) {
                stats.skipped_files += 1;
                debug!("Skipping file: {}", path.display());
                continue;
            }

            let file = FileInfo {
                path: path.to_path_buf(),
                language: Language::from_path(path),
                size: metadata.len(),
                modified: metadata.modified().ok(),
            };
            stats.add_file(&file);

            if !sink(file) {
                debug!("Walk consumer went away, stopping");
                break;
            }
        }

        stats.log_summary();
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn default_filter() -> Arc<dyn FileFilter> {
        Arc::new(DefaultFileFilter::default())
    }

    #[test]
    fn test_file_walker_basic() {
        let dir = TempDir::new().unwrap();

        fs::write(dir.path().join("test.rs"), "fn main() {}").unwrap();
        fs::write(dir.path().join("test.py"), "print('hello')").unwrap();
        fs::write(dir.path().join("README.md"), "# Test").unwrap();

        let walker = FileWalker::new(dir.path());
        let (files, stats) = walker.walk(default_filter()).unwrap();

        assert_eq!(files.len(), 3);
        assert_eq!(stats.indexable_files, 3);
        assert!(files.iter().all(|f| f.modified.is_some()));
    }

    #[test]
    fn test_skip_binary_files() {
        let dir = TempDir::new().unwrap();

        fs::write(dir.path().join("test.txt"), "hello world").unwrap();
        fs::write(dir.path().join("test.bin"), [0u8, 1, 2, 3, 255]).unwrap();

        let walker = FileWalker::new(dir.path());
        let (files, stats) = walker.walk(default_filter()).unwrap();

        assert_eq!(files.len(), 1);
        assert!(stats.skipped_files > 0);
    }

    #[test]
    fn test_excluded_directories_are_pruned() {
        let dir = TempDir::new().unwrap();

        let node_modules = dir.path().join("node_modules");
        fs::create_dir(&node_modules).unwrap();
        fs::write(node_modules.join("package.js"), "test").unwrap();
        fs::write(dir.path().join("index.js"), "test").unwrap();

        let walker = FileWalker::new(dir.path());
        let (files, stats) = walker.walk(default_filter()).unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path.file_name().unwrap(), "index.js");
        // The pruned subtree is never visited, so nothing inside it is counted as skipped.
        assert_eq!(stats.skipped_files, 0);
    }

    #[test]
    fn test_custom_ignore_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".codeindexignore"), "secret.rs\n").unwrap();
        fs::write(dir.path().join("secret.rs"), "fn hidden() {}").unwrap();
        fs::write(dir.path().join("open.rs"), "fn visible() {}").unwrap();

        let (files, _) = FileWalker::new(dir.path()).walk(default_filter()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["open.rs".to_string()]);
    }

    #[tokio::test]
    async fn test_stream_yields_files() {
        let dir = TempDir::new().unwrap();
        for i in 0..5 {
            fs::write(dir.path().join(format!("f{}.go", i)), "package main\n").unwrap();
        }

        let walker = FileWalker::new(dir.path());
        let (mut rx, handle) = walker.stream(default_filter(), CancellationToken::new());

        let mut count = 0;
        while let Some(file) = rx.recv().await {
            assert_eq!(file.language, Language::Go);
            count += 1;
        }
        let stats = handle.await.unwrap().unwrap();

        assert_eq!(count, 5);
        assert_eq!(stats.indexable_files, 5);
    }

    #[tokio::test]
    async fn test_stream_respects_cancellation() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let (mut rx, handle) = FileWalker::new(dir.path()).stream(default_filter(), cancel);

        assert!(rx.recv().await.is_none());
        assert!(matches!(handle.await.unwrap(), Err(IndexError::Cancelled)));
    }
}
