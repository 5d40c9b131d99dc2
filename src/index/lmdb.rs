//! Helpers shared by the LMDB-backed stores.
//!
//! Rows are keyed `"{dir}/{file}/{seq}"` where `dir` and `file` are short
//! SHA-256 prefixes, so keys stay well under LMDB's 511-byte limit and all
//! rows of a file or working directory share a key prefix.

use crate::error::Result;
use heed::types::{DecodeIgnore, Str};
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;

const HASH_CHARS: usize = 16;
const VERSION_KEY: &str = "version";

pub(crate) fn open_env(dir: &Path, map_size: usize, max_dbs: u32) -> Result<Env> {
    std::fs::create_dir_all(dir)?;
    // SAFETY: each store directory is opened by exactly one Env in this process
    let env = unsafe {
        EnvOpenOptions::new()
            .map_size(map_size)
            .max_dbs(max_dbs)
            .open(dir)?
    };
    Ok(env)
}

fn short_hash(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    digest[..HASH_CHARS / 2]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

pub(crate) fn dir_prefix(working_dir: &str) -> String {
    format!("{}/", short_hash(working_dir))
}

pub(crate) fn file_prefix(working_dir: &str, file_path: &str) -> String {
    format!("{}{}/", dir_prefix(working_dir), short_hash(file_path))
}

pub(crate) fn row_key(working_dir: &str, file_path: &str, seq: usize) -> String {
    format!("{}{:06}", file_prefix(working_dir, file_path), seq)
}

/// Delete every row whose key starts with `prefix`
pub(crate) fn delete_prefix<V: 'static>(
    db: Database<Str, V>,
    wtxn: &mut RwTxn,
    prefix: &str,
) -> Result<usize> {
    let keys = {
        let rows = db.remap_data_type::<DecodeIgnore>().prefix_iter(wtxn, prefix)?;
        rows.map(|row| row.map(|(key, _)| key.to_string()))
            .collect::<heed::Result<Vec<String>>>()?
    };
    for key in &keys {
        db.delete(wtxn, key.as_str())?;
    }
    Ok(keys.len())
}

/// Distinct files and working directories among the row keys of `db`
pub(crate) fn key_stats<V: 'static>(db: Database<Str, V>, rtxn: &RoTxn) -> Result<(u64, u64, u64)> {
    let mut rows = 0u64;
    let mut files = HashSet::new();
    let mut dirs = HashSet::new();
    for row in db.remap_data_type::<DecodeIgnore>().iter(rtxn)? {
        let (key, _) = row?;
        rows += 1;
        if let Some(file) = key.get(..HASH_CHARS * 2 + 1) {
            files.insert(file.to_string());
        }
        if let Some(dir) = key.get(..HASH_CHARS) {
            dirs.insert(dir.to_string());
        }
    }
    Ok((rows, files.len() as u64, dirs.len() as u64))
}

/// Record `version` in `meta`; returns true when a different version was stored
pub(crate) fn check_version(meta: Database<Str, Str>, wtxn: &mut RwTxn, version: &str) -> Result<bool> {
    let stale = match meta.get(wtxn, VERSION_KEY)? {
        Some(stored) => stored != version,
        None => false,
    };
    meta.put(wtxn, VERSION_KEY, version)?;
    Ok(stale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_key_layout() {
        let key = row_key("/repo", "/repo/src/main.rs", 7);
        assert_eq!(key.len(), HASH_CHARS * 2 + 2 + 6);
        assert!(key.starts_with(&file_prefix("/repo", "/repo/src/main.rs")));
        assert!(key.starts_with(&dir_prefix("/repo")));
        assert!(key.ends_with("000007"));
        assert!(!key.starts_with(&dir_prefix("/other")));
    }

    #[test]
    fn test_delete_prefix_and_stats() -> Result<()> {
        let dir = tempdir()?;
        let env = open_env(dir.path(), 10 * 1024 * 1024, 2)?;
        let mut wtxn = env.write_txn()?;
        let db: Database<Str, Str> = env.create_database(&mut wtxn, Some("rows"))?;
        db.put(&mut wtxn, &row_key("/a", "/a/x", 0), "x0")?;
        db.put(&mut wtxn, &row_key("/a", "/a/x", 1), "x1")?;
        db.put(&mut wtxn, &row_key("/a", "/a/y", 0), "y0")?;
        db.put(&mut wtxn, &row_key("/b", "/b/x", 0), "bx")?;

        assert_eq!(key_stats(db, &wtxn)?, (4, 3, 2));
        assert_eq!(delete_prefix(db, &mut wtxn, &file_prefix("/a", "/a/x"))?, 2);
        assert_eq!(delete_prefix(db, &mut wtxn, &dir_prefix("/b"))?, 1);
        assert_eq!(key_stats(db, &wtxn)?, (1, 1, 1));
        wtxn.commit()?;
        Ok(())
    }

    #[test]
    fn test_version_check() -> Result<()> {
        let dir = tempdir()?;
        let env = open_env(dir.path(), 10 * 1024 * 1024, 2)?;
        let mut wtxn = env.write_txn()?;
        let meta: Database<Str, Str> = env.create_database(&mut wtxn, Some("meta"))?;
        assert!(!check_version(meta, &mut wtxn, "v1")?);
        assert!(!check_version(meta, &mut wtxn, "v1")?);
        assert!(check_version(meta, &mut wtxn, "v2")?);
        wtxn.commit()?;
        Ok(())
    }
}
