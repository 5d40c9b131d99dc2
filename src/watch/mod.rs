use crate::error::{IndexError, Result};
use crate::file::FileFilter;
use crate::index::{normalize_path, IndexManager};
use notify::{EventKind, RecursiveMode, Watcher};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, DebouncedEvent};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Debounced batches waiting to be applied
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Keeps an indexed working directory in sync with the file system
pub struct IndexWatcher {
    manager: Arc<IndexManager>,
    filter: Arc<dyn FileFilter>,
    debounce: Duration,
}

impl IndexWatcher {
    pub fn new(manager: Arc<IndexManager>, filter: Arc<dyn FileFilter>, debounce: Duration) -> Self {
        Self {
            manager,
            filter,
            debounce,
        }
    }

    /// Refresh the index on every debounced change under `working_dir` until cancelled
    pub async fn watch(&self, cancel: &CancellationToken, working_dir: &Path) -> Result<()> {
        let working_dir = normalize_path(working_dir);
        if !self.manager.is_index_ready(&working_dir).await {
            return Err(IndexError::NotReady(working_dir));
        }

        let (tx, mut rx) = mpsc::channel::<DebounceEventResult>(EVENT_CHANNEL_CAPACITY);
        let mut debouncer = new_debouncer(self.debounce, None, move |result| {
            // Runs on the debouncer thread
            let _ = tx.blocking_send(result);
        })?;
        debouncer
            .watcher()
            .watch(&working_dir, RecursiveMode::Recursive)?;
        info!("Watching {} for changes", working_dir.display());

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                batch = rx.recv() => match batch {
                    Some(Ok(events)) => {
                        let paths = changed_paths(&events, &working_dir, self.filter.as_ref());
                        if paths.is_empty() {
                            continue;
                        }
                        debug!("{} changed path(s) under {}", paths.len(), working_dir.display());
                        match self.manager.refresh_index(cancel, &paths).await {
                            Ok(()) => info!("Refreshed {} file(s)", paths.len()),
                            Err(e) if e.is_cancelled() => break,
                            Err(e) => warn!("Refresh failed: {}", e),
                        }
                    }
                    Some(Err(errors)) => {
                        for error in errors {
                            warn!("Watch error: {}", error);
                        }
                    }
                    None => break,
                }
            }
        }

        debug!("Stopped watching {}", working_dir.display());
        Ok(())
    }
}

/// Files touched by `events` that live under `working_dir` outside ignored directories
fn changed_paths(events: &[DebouncedEvent], working_dir: &Path, filter: &dyn FileFilter) -> Vec<PathBuf> {
    let mut paths = BTreeSet::new();
    for event in events {
        if matches!(event.kind, EventKind::Access(_)) {
            continue;
        }
        for path in &event.paths {
            if !path.starts_with(working_dir) || path.is_dir() {
                continue;
            }
            if filter.is_ignored_within(working_dir, path) {
                continue;
            }
            paths.insert(path.clone());
        }
    }
    paths.into_iter().collect()
}
