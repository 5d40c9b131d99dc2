use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Build state of one working directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStatus {
    pub working_directory: PathBuf,
    pub is_building: bool,
    pub is_ready: bool,
    pub total_files: u64,
    pub indexed_files: u64,
    pub total_size: u64,
    /// Index name to store version
    pub index_versions: BTreeMap<String, String>,
    pub errors: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

impl IndexStatus {
    pub fn building(working_directory: PathBuf) -> Self {
        Self {
            working_directory,
            is_building: true,
            is_ready: false,
            total_files: 0,
            indexed_files: 0,
            total_size: 0,
            index_versions: BTreeMap::new(),
            errors: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    /// Finished with errors; still queryable against the indexes that succeeded
    pub fn is_failed(&self) -> bool {
        !self.is_building && !self.errors.is_empty()
    }

    pub fn progress(&self) -> f64 {
        if self.total_files == 0 {
            if self.is_ready {
                1.0
            } else {
                0.0
            }
        } else {
            self.indexed_files as f64 / self.total_files as f64
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_flags() {
        let mut status = IndexStatus::building(PathBuf::from("/repo"));
        assert!(status.is_building);
        assert!(!status.is_ready);
        assert!(!status.is_failed());

        status.is_building = false;
        status.errors.push("symbols: boom".into());
        assert!(status.is_failed());
    }

    #[test]
    fn test_progress() {
        let mut status = IndexStatus::building(PathBuf::from("/repo"));
        assert_eq!(status.progress(), 0.0);
        status.total_files = 4;
        status.indexed_files = 1;
        assert!((status.progress() - 0.25).abs() < f64::EPSILON);
    }
}
