use super::{path_key, Index, IndexChanges, IndexStats, IndexStatus, IndexTag, WILDCARD};
use crate::config::IndexingConfig;
use crate::error::{IndexError, Result};
use crate::file::{FileFilter, FileWalker};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome of one index task during a build
type IndexOutcome = (String, String, Result<()>);

/// Owns the registered indexes and the build status of every working directory
pub struct IndexManager {
    indexes: RwLock<Vec<Arc<dyn Index>>>,
    statuses: RwLock<HashMap<PathBuf, IndexStatus>>,
    build_lock: Mutex<()>,
    filter: Arc<dyn FileFilter>,
    status_update_interval: usize,
    poll_interval: Duration,
    respect_gitignore: bool,
    /// Snapshot of finished statuses so a later process can query without rebuilding
    status_file: Option<PathBuf>,
}

impl IndexManager {
    pub fn new(filter: Arc<dyn FileFilter>, config: &IndexingConfig) -> Self {
        Self {
            indexes: RwLock::new(Vec::new()),
            statuses: RwLock::new(HashMap::new()),
            build_lock: Mutex::new(()),
            filter,
            status_update_interval: config.status_update_interval.max(1),
            poll_interval: config.poll_interval(),
            respect_gitignore: config.respect_gitignore,
            status_file: None,
        }
    }

    /// Persist finished statuses to `path`, loading whatever it already holds
    pub fn with_status_file(mut self, path: PathBuf) -> Result<Self> {
        if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            let saved: Vec<IndexStatus> = serde_json::from_str(&text)?;
            let statuses = self.statuses.get_mut();
            for status in saved.into_iter().filter(|s| !s.is_building) {
                statuses.insert(status.working_directory.clone(), status);
            }
            debug!("Restored {} index status(es) from {}", statuses.len(), path.display());
        }
        self.status_file = Some(path);
        Ok(self)
    }

    /// Register an index; registration order is update order. A same-named index is replaced.
    pub async fn register(&self, index: Arc<dyn Index>) {
        let mut indexes = self.indexes.write().await;
        match indexes.iter().position(|i| i.name() == index.name()) {
            Some(pos) => indexes[pos] = index,
            None => indexes.push(index),
        }
    }

    pub async fn get_index(&self, name: &str) -> Option<Arc<dyn Index>> {
        self.indexes
            .read()
            .await
            .iter()
            .find(|i| i.name() == name)
            .cloned()
    }

    pub async fn indexes(&self) -> Vec<Arc<dyn Index>> {
        self.indexes.read().await.clone()
    }

    /// Walk `working_dir` and index every discovered file in all registered indexes
    ///
    /// Returns the final status when every index succeeded, otherwise an
    /// aggregate error; the status is kept either way.
    pub async fn build_index(&self, cancel: &CancellationToken, working_dir: &Path) -> Result<IndexStatus> {
        let _build = tokio::select! {
            guard = self.build_lock.lock() => guard,
            _ = cancel.cancelled() => return Err(IndexError::Cancelled),
        };

        let working_dir = normalize_path(working_dir);
        if !working_dir.is_dir() {
            return Err(IndexError::NotFound(working_dir));
        }
        let tag = IndexTag::detect(&working_dir);
        info!(
            "Building index for {} (branch: {})",
            working_dir.display(),
            tag.branch.as_deref().unwrap_or("-")
        );
        self.statuses
            .write()
            .await
            .insert(working_dir.clone(), IndexStatus::building(working_dir.clone()));

        // Discovery
        let walker = FileWalker::new(&working_dir).respect_gitignore(self.respect_gitignore);
        let (mut files, walk) = walker.stream(Arc::clone(&self.filter), cancel.clone());
        let mut added = Vec::new();
        let mut total_size = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    walk.abort();
                    return self.abort_build(&working_dir).await;
                }
                file = files.recv() => match file {
                    Some(file) => {
                        total_size += file.size;
                        added.push(file.path);
                        if added.len() % self.status_update_interval == 0 {
                            self.record_progress(&working_dir, added.len() as u64, total_size).await;
                        }
                    }
                    None => break,
                }
            }
        }

        let mut errors = Vec::new();
        match walk.await? {
            Ok(_) => {}
            Err(e) if e.is_cancelled() => return self.abort_build(&working_dir).await,
            Err(e) => {
                warn!("Walk of {} failed: {}", working_dir.display(), e);
                errors.push(format!("walk: {}", e));
            }
        }
        let total_files = added.len() as u64;
        self.record_progress(&working_dir, total_files, total_size).await;

        if cancel.is_cancelled() {
            return self.abort_build(&working_dir).await;
        }

        // An incomplete walk cannot tell which files vanished
        let on_disk: Option<Arc<HashSet<String>>> =
            errors.is_empty().then(|| Arc::new(added.iter().map(|p| path_key(p)).collect()));

        // Fan out to every index
        let changes = Arc::new(IndexChanges::added(added));
        let tag = Arc::new(tag);
        let mut tasks: JoinSet<IndexOutcome> = JoinSet::new();
        for index in self.indexes().await {
            let cancel = cancel.clone();
            let changes = Arc::clone(&changes);
            let tag = Arc::clone(&tag);
            let on_disk = on_disk.clone();
            tasks.spawn(async move {
                let outcome = async {
                    if let Some(on_disk) = &on_disk {
                        drop_vanished(index.as_ref(), &cancel, &tag, on_disk).await?;
                    }
                    index.update(&cancel, &tag, &changes).await
                }
                .await;
                (index.name().to_string(), index.version().to_string(), outcome)
            });
        }

        let mut versions = BTreeMap::new();
        let mut failed_files = HashSet::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    return self.abort_build(&working_dir).await;
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((name, version, Ok(())))) => {
                        debug!("Index {} finished {}", name, working_dir.display());
                        versions.insert(name, version);
                    }
                    Some(Ok((_, _, Err(IndexError::Cancelled)))) => {
                        tasks.abort_all();
                        return self.abort_build(&working_dir).await;
                    }
                    Some(Ok((name, version, Err(e)))) => {
                        error!("Index {} failed for {}: {}", name, working_dir.display(), e);
                        if let IndexError::PartialUpdate { failed, .. } = &e {
                            failed_files.extend(failed.iter().map(|(path, _)| path.clone()));
                            // Partially updated stores are still usable
                            versions.insert(name.clone(), version);
                        }
                        errors.push(format!("{}: {}", name, e));
                    }
                    Some(Err(e)) => {
                        error!("Index task for {} panicked: {}", working_dir.display(), e);
                        errors.push(format!("index task: {}", e));
                    }
                }
            }
        }

        let status = {
            let mut statuses = self.statuses.write().await;
            let status = statuses
                .entry(working_dir.clone())
                .or_insert_with(|| IndexStatus::building(working_dir.clone()));
            status.is_building = false;
            status.is_ready = errors.is_empty();
            status.total_files = total_files;
            status.total_size = total_size;
            status.indexed_files = total_files.saturating_sub(failed_files.len() as u64);
            status.index_versions = versions;
            status.errors = errors.clone();
            status.touch();
            status.clone()
        };
        self.persist_statuses().await;

        match IndexError::aggregate(errors) {
            None => {
                info!(
                    "Indexed {} files ({:.1} MB) in {}",
                    status.indexed_files,
                    status.total_size as f64 / (1024.0 * 1024.0),
                    working_dir.display()
                );
                Ok(status)
            }
            Some(err) => Err(err),
        }
    }

    /// Re-index changed paths of an already indexed working directory
    pub async fn refresh_index(&self, cancel: &CancellationToken, paths: &[PathBuf]) -> Result<()> {
        let Some(first) = paths.first() else {
            return Ok(());
        };
        let paths: Vec<PathBuf> = paths.iter().map(|p| normalize_path(p)).collect();
        let first_normalized = normalize_path(first);
        let working_dir = self
            .find_working_dir(&first_normalized)
            .await
            .ok_or_else(|| IndexError::NotFound(first.clone()))?;

        let mut modified = Vec::new();
        let mut deleted = Vec::new();
        for path in paths {
            if !path.starts_with(&working_dir) {
                warn!("{} is outside {}, ignoring", path.display(), working_dir.display());
                continue;
            }
            match std::fs::metadata(&path) {
                Ok(meta) if meta.is_dir() => {}
                Ok(meta) => {
                    if self.filter.is_ignored_within(&working_dir, &path)
                        || !self.filter.should_index(&path, &meta)
                    {
                        // Previously indexed files may have become ignored
                        deleted.push(path);
                    } else {
                        modified.push(path);
                    }
                }
                Err(_) => deleted.push(path),
            }
        }

        let changes = IndexChanges::new(Vec::new(), modified, deleted);
        if changes.is_empty() {
            return Ok(());
        }
        debug!(
            "Refreshing {}: {} modified, {} deleted",
            working_dir.display(),
            changes.modified.len(),
            changes.deleted.len()
        );

        let tag = IndexTag::detect(&working_dir);
        let mut errors = Vec::new();
        for index in self.indexes().await {
            if cancel.is_cancelled() {
                return Err(IndexError::Cancelled);
            }
            match index.update(cancel, &tag, &changes).await {
                Ok(()) => {}
                Err(IndexError::Cancelled) => return Err(IndexError::Cancelled),
                Err(e) => {
                    warn!("Refresh of {} in {} failed: {}", working_dir.display(), index.name(), e);
                    errors.push(format!("{}: {}", index.name(), e));
                }
            }
        }

        if let Some(status) = self.statuses.write().await.get_mut(&working_dir) {
            status.touch();
        }
        self.persist_statuses().await;

        match IndexError::aggregate(errors) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Drop all indexed data of `working_dir` and forget its status
    pub async fn clear_index(&self, cancel: &CancellationToken, working_dir: &Path) -> Result<()> {
        let _build = tokio::select! {
            guard = self.build_lock.lock() => guard,
            _ = cancel.cancelled() => return Err(IndexError::Cancelled),
        };
        let working_dir = normalize_path(working_dir);
        let tag = IndexTag::new(&working_dir);
        let everything = [PathBuf::from(WILDCARD)];

        let mut errors = Vec::new();
        for index in self.indexes().await {
            if let Err(e) = index.remove(cancel, &tag, &everything).await {
                if e.is_cancelled() {
                    return Err(e);
                }
                error!("Clearing {} in {} failed: {}", working_dir.display(), index.name(), e);
                errors.push(format!("{}: {}", index.name(), e));
            }
        }

        self.statuses.write().await.remove(&working_dir);
        self.persist_statuses().await;
        info!("Cleared index for {}", working_dir.display());

        match IndexError::aggregate(errors) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    pub async fn get_index_status(&self, working_dir: &Path) -> Result<IndexStatus> {
        let working_dir = normalize_path(working_dir);
        self.statuses
            .read()
            .await
            .get(&working_dir)
            .cloned()
            .ok_or(IndexError::NotFound(working_dir))
    }

    pub async fn is_index_ready(&self, working_dir: &Path) -> bool {
        self.get_index_status(working_dir)
            .await
            .map(|s| s.is_ready && !s.is_building)
            .unwrap_or(false)
    }

    /// Poll until the build of `working_dir` finishes
    pub async fn wait_for_index(&self, cancel: &CancellationToken, working_dir: &Path) -> Result<IndexStatus> {
        let working_dir = normalize_path(working_dir);
        loop {
            if let Ok(status) = self.get_index_status(&working_dir).await {
                if status.is_ready && !status.is_building {
                    return Ok(status);
                }
                if status.is_failed() {
                    return Err(IndexError::Aggregate(status.errors));
                }
                if !status.is_building {
                    // Aborted build
                    return Err(IndexError::NotReady(working_dir));
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(IndexError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    pub async fn working_directories(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self.statuses.read().await.keys().cloned().collect();
        dirs.sort();
        dirs
    }

    pub async fn stats(&self) -> Result<Vec<IndexStats>> {
        let mut stats = Vec::new();
        for index in self.indexes().await {
            stats.push(index.stats().await?);
        }
        Ok(stats)
    }

    pub async fn close(&self) -> Result<()> {
        let mut errors = Vec::new();
        for index in self.indexes().await {
            if let Err(e) = index.close().await {
                errors.push(format!("{}: {}", index.name(), e));
            }
        }
        match IndexError::aggregate(errors) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Nearest ancestor of `path` with a ready index
    async fn find_working_dir(&self, path: &Path) -> Option<PathBuf> {
        let statuses = self.statuses.read().await;
        path.ancestors()
            .skip(1)
            .find(|dir| statuses.get(*dir).map(|s| s.is_ready).unwrap_or(false))
            .map(Path::to_path_buf)
    }

    async fn record_progress(&self, working_dir: &Path, total_files: u64, total_size: u64) {
        if let Some(status) = self.statuses.write().await.get_mut(working_dir) {
            status.total_files = total_files;
            status.total_size = total_size;
            status.touch();
        }
    }

    async fn abort_build(&self, working_dir: &Path) -> Result<IndexStatus> {
        warn!("Build of {} cancelled", working_dir.display());
        if let Some(status) = self.statuses.write().await.get_mut(working_dir) {
            status.is_building = false;
            status.is_ready = false;
            status.touch();
        }
        Err(IndexError::Cancelled)
    }

    async fn persist_statuses(&self) {
        let Some(path) = &self.status_file else {
            return;
        };
        let snapshot: Vec<IndexStatus> = self
            .statuses
            .read()
            .await
            .values()
            .filter(|s| !s.is_building)
            .cloned()
            .collect();
        let written = serde_json::to_string_pretty(&snapshot)
            .map_err(IndexError::from)
            .and_then(|json| std::fs::write(path, json).map_err(IndexError::from));
        if let Err(e) = written {
            warn!("Could not save index status to {}: {}", path.display(), e);
        }
    }
}

/// Canonical form of a path; falls back to resolving the parent for deleted files
/// Remove files `index` still holds for the tag's working directory but the walk no longer found
async fn drop_vanished(
    index: &dyn Index,
    cancel: &CancellationToken,
    tag: &IndexTag,
    on_disk: &HashSet<String>,
) -> Result<()> {
    let known = match index.indexed_files(&tag.working_dir_key()).await {
        Ok(known) => known,
        Err(e) => {
            warn!("Could not list files of {}: {}", index.name(), e);
            return Ok(());
        }
    };
    let vanished: Vec<PathBuf> = known.difference(on_disk).map(PathBuf::from).collect();
    if vanished.is_empty() {
        return Ok(());
    }
    debug!("{}: dropping {} vanished file(s)", index.name(), vanished.len());
    index.remove(cancel, tag, &vanished).await
}

pub fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map(|p| p.join(name))
            .unwrap_or(absolute.clone()),
        _ => absolute,
    }
}
