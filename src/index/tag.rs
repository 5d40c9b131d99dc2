use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Identifies the snapshot of a working directory an update belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexTag {
    pub working_directory: PathBuf,
    pub branch: Option<String>,
    pub commit: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl IndexTag {
    pub fn new(working_directory: impl Into<PathBuf>) -> Self {
        Self {
            working_directory: working_directory.into(),
            branch: None,
            commit: None,
            timestamp: Utc::now(),
        }
    }

    /// Tag with the branch and commit checked out in `working_directory`, when it is a git repo
    pub fn detect(working_directory: impl Into<PathBuf>) -> Self {
        let mut tag = Self::new(working_directory);
        if let Some(git_dir) = git_dir(&tag.working_directory) {
            if let Ok(head) = fs::read_to_string(git_dir.join("HEAD")) {
                let head = head.trim();
                match head.strip_prefix("ref: ") {
                    Some(reference) => {
                        tag.branch = reference.strip_prefix("refs/heads/").map(String::from);
                        tag.commit = resolve_ref(&git_dir, reference);
                    }
                    None if !head.is_empty() => tag.commit = Some(head.to_string()),
                    None => {}
                }
            }
        }
        tag
    }

    pub fn working_dir_key(&self) -> String {
        self.working_directory.to_string_lossy().into_owned()
    }
}

/// `.git` is a directory in clones and a `gitdir:` pointer file in worktrees
fn git_dir(working_directory: &Path) -> Option<PathBuf> {
    let dot_git = working_directory.join(".git");
    if dot_git.is_dir() {
        return Some(dot_git);
    }
    let pointer = fs::read_to_string(&dot_git).ok()?;
    let target = pointer.trim().strip_prefix("gitdir:")?.trim();
    let target = Path::new(target);
    Some(if target.is_absolute() {
        target.to_path_buf()
    } else {
        working_directory.join(target)
    })
}

fn resolve_ref(git_dir: &Path, reference: &str) -> Option<String> {
    if let Ok(commit) = fs::read_to_string(git_dir.join(reference)) {
        let commit = commit.trim();
        if !commit.is_empty() {
            return Some(commit.to_string());
        }
    }
    let packed = fs::read_to_string(git_dir.join("packed-refs")).ok()?;
    packed
        .lines()
        .filter(|line| !line.starts_with('#') && !line.starts_with('^'))
        .find_map(|line| {
            let (commit, name) = line.split_once(' ')?;
            (name.trim() == reference).then(|| commit.to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const COMMIT: &str = "0123456789abcdef0123456789abcdef01234567";

    #[test]
    fn test_detect_branch_and_loose_ref() {
        let dir = tempdir().unwrap();
        let git = dir.path().join(".git");
        fs::create_dir_all(git.join("refs/heads")).unwrap();
        fs::write(git.join("HEAD"), "ref: refs/heads/main\n").unwrap();
        fs::write(git.join("refs/heads/main"), format!("{}\n", COMMIT)).unwrap();

        let tag = IndexTag::detect(dir.path());
        assert_eq!(tag.branch.as_deref(), Some("main"));
        assert_eq!(tag.commit.as_deref(), Some(COMMIT));
    }

    #[test]
    fn test_detect_packed_ref() {
        let dir = tempdir().unwrap();
        let git = dir.path().join(".git");
        fs::create_dir_all(&git).unwrap();
        fs::write(git.join("HEAD"), "ref: refs/heads/dev\n").unwrap();
        fs::write(
            git.join("packed-refs"),
            format!("# pack-refs with: peeled\n{} refs/heads/dev\n", COMMIT),
        )
        .unwrap();

        let tag = IndexTag::detect(dir.path());
        assert_eq!(tag.branch.as_deref(), Some("dev"));
        assert_eq!(tag.commit.as_deref(), Some(COMMIT));
    }

    #[test]
    fn test_detached_head() {
        let dir = tempdir().unwrap();
        let git = dir.path().join(".git");
        fs::create_dir_all(&git).unwrap();
        fs::write(git.join("HEAD"), COMMIT).unwrap();

        let tag = IndexTag::detect(dir.path());
        assert_eq!(tag.branch, None);
        assert_eq!(tag.commit.as_deref(), Some(COMMIT));
    }

    #[test]
    fn test_not_a_repo() {
        let dir = tempdir().unwrap();
        let tag = IndexTag::detect(dir.path());
        assert_eq!(tag.branch, None);
        assert_eq!(tag.commit, None);
        assert_eq!(tag.working_directory, dir.path());
    }
}
