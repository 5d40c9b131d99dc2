use super::{RetrievalRequest, RetrievalResult, Retriever};
use crate::error::{IndexError, Result};
use crate::file::{FileFilter, FileInfo, FileWalker};
use crate::index::{make_snippet, SearchResult, SearchType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Added to the recency score when the file name contains the query
const NAME_MATCH_BOOST: f32 = 1.0;

/// Lines of each file used as result content
const PREVIEW_LINES: usize = 20;

/// Most recently modified files of the working directory
///
/// Reads file metadata straight from disk, so it works before any index is built.
pub struct RecentFilesRetriever {
    filter: Arc<dyn FileFilter>,
    respect_gitignore: bool,
}

impl RecentFilesRetriever {
    pub fn new(filter: Arc<dyn FileFilter>) -> Self {
        Self {
            filter,
            respect_gitignore: true,
        }
    }

    pub fn respect_gitignore(mut self, respect: bool) -> Self {
        self.respect_gitignore = respect;
        self
    }
}

/// Rank files newest first, then boost those whose name contains `query`
fn rank_files(mut files: Vec<FileInfo>, query: &str) -> Vec<(f32, FileInfo)> {
    files.sort_by(|a, b| {
        Reverse(a.modified)
            .cmp(&Reverse(b.modified))
            .then_with(|| a.path.cmp(&b.path))
    });

    let needle = query.trim().to_lowercase();
    let mut ranked: Vec<(f32, FileInfo)> = files
        .into_iter()
        .enumerate()
        .map(|(rank, file)| {
            let mut score = 1.0 / (1.0 + rank as f32);
            if !needle.is_empty() && file_name(&file.path).to_lowercase().contains(&needle) {
                score += NAME_MATCH_BOOST;
            }
            (score, file)
        })
        .collect();
    // Stable, so recency order survives among equal boosts
    ranked.sort_by(|(a, _), (b, _)| b.total_cmp(a));
    ranked
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

fn preview(path: &Path) -> String {
    std::fs::read_to_string(path)
        .map(|text| text.lines().take(PREVIEW_LINES).collect::<Vec<_>>().join("\n"))
        .unwrap_or_default()
}

#[async_trait]
impl Retriever for RecentFilesRetriever {
    fn name(&self) -> &str {
        "recent_files"
    }

    fn supports_query(&self, _query: &str) -> bool {
        true
    }

    async fn retrieve(&self, cancel: &CancellationToken, request: &RetrievalRequest) -> Result<RetrievalResult> {
        let start = Instant::now();
        let options = &request.options;
        let walker = FileWalker::new(&options.working_directory).respect_gitignore(self.respect_gitignore);
        let (mut rx, walk) = walker.stream(Arc::clone(&self.filter), cancel.clone());

        let mut files = Vec::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    walk.abort();
                    return Err(IndexError::Cancelled);
                }
                file = rx.recv() => match file {
                    Some(file) => {
                        if options.accepts(&file.path.to_string_lossy(), file.language) {
                            files.push(file);
                        }
                    }
                    None => break,
                }
            }
        }
        walk.await??;

        let total = files.len();
        let mut ranked = rank_files(files, &request.query);
        ranked.truncate(options.max_results);

        let mut results = Vec::with_capacity(ranked.len());
        for (score, file) in ranked {
            let path = file.path.clone();
            let content = tokio::task::spawn_blocking(move || preview(&path)).await?;
            let lines = content.lines().count().max(1);
            let mut result = SearchResult::new(
                file.path.to_string_lossy(),
                1,
                lines,
                content,
                score,
                SearchType::RecentFiles,
            )
            .with_metadata("language", file.language.id())
            .with_metadata("size", file.size);
            if let Some(modified) = file.modified {
                result = result.with_metadata("modified", DateTime::<Utc>::from(modified).to_rfc3339());
            }
            if result.content.is_empty() {
                result.snippet = make_snippet(file_name(&file.path));
            }
            results.push(result);
        }

        debug!("recent_files retriever: {} of {} file(s)", results.len(), total);
        let mut outcome = RetrievalResult::new(results, start.elapsed());
        outcome.total_results = total;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{DefaultFileFilter, Language};
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    fn info(path: &str, age_secs: u64) -> FileInfo {
        FileInfo {
            path: PathBuf::from(path),
            language: Language::Rust,
            size: 1,
            modified: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000 - age_secs)),
        }
    }

    #[test]
    fn test_newest_first() {
        let ranked = rank_files(vec![info("/w/old.rs", 100), info("/w/new.rs", 1), info("/w/mid.rs", 50)], "");
        let names: Vec<&str> = ranked.iter().map(|(_, f)| file_name(&f.path)).collect();
        assert_eq!(names, vec!["new.rs", "mid.rs", "old.rs"]);
        assert_eq!(ranked[0].0, 1.0);
        assert_eq!(ranked[1].0, 0.5);
    }

    #[test]
    fn test_name_match_boost() {
        let ranked = rank_files(vec![info("/w/config.rs", 100), info("/w/main.rs", 1)], "Config");
        assert_eq!(file_name(&ranked[0].1.path), "config.rs");
        assert!(ranked[0].0 > 1.0);
    }

    #[tokio::test]
    async fn test_retrieve_from_disk() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "pub fn answer() -> u32 { 42 }\n").unwrap();
        std::fs::write(dir.path().join("notes.md"), "# Notes\n").unwrap();

        let retriever = RecentFilesRetriever::new(Arc::new(DefaultFileFilter::default()));
        let request = RetrievalRequest::new("", dir.path()).with_extensions(vec!["rs".to_string()]);
        let result = retriever.retrieve(&CancellationToken::new(), &request).await.unwrap();

        assert_eq!(result.total_results, 1);
        assert!(result.results[0].file_path.ends_with("lib.rs"));
        assert_eq!(result.results[0].search_type, SearchType::RecentFiles);
        assert!(result.results[0].content.contains("answer"));
    }
}
