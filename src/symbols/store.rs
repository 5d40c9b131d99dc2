use crate::error::Result;
use crate::index::lmdb;
use crate::parser::SymbolInfo;
use heed::types::{SerdeBincode, Str};
use heed::{Database, Env};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub working_dir: String,
    pub symbol: SymbolInfo,
}

/// LMDB table of symbols, one row per declaration
#[derive(Clone)]
pub struct SymbolStore {
    env: Env,
    symbols: Database<Str, SerdeBincode<SymbolRecord>>,
}

impl SymbolStore {
    /// Open the store, dropping rows written by a different `version`
    pub fn open(dir: &Path, map_size: usize, version: &str) -> Result<Self> {
        let env = lmdb::open_env(dir, map_size, 2)?;
        let mut wtxn = env.write_txn()?;
        let symbols: Database<Str, SerdeBincode<SymbolRecord>> =
            env.create_database(&mut wtxn, Some("symbols"))?;
        let meta: Database<Str, Str> = env.create_database(&mut wtxn, Some("meta"))?;
        if lmdb::check_version(meta, &mut wtxn, version)? {
            warn!("Symbol store at {} is from another version, clearing", dir.display());
            symbols.clear(&mut wtxn)?;
        }
        wtxn.commit()?;

        Ok(Self { env, symbols })
    }

    /// Replace the symbols of each file; all files land in one transaction
    pub fn replace_files(&self, working_dir: &str, files: &[(String, Vec<SymbolInfo>)]) -> Result<usize> {
        let mut wtxn = self.env.write_txn()?;
        let mut written = 0;
        for (file_path, symbols) in files {
            lmdb::delete_prefix(self.symbols, &mut wtxn, &lmdb::file_prefix(working_dir, file_path))?;
            for (seq, symbol) in symbols.iter().enumerate() {
                let record = SymbolRecord {
                    working_dir: working_dir.to_string(),
                    symbol: symbol.clone(),
                };
                self.symbols
                    .put(&mut wtxn, &lmdb::row_key(working_dir, file_path, seq), &record)?;
                written += 1;
            }
        }
        wtxn.commit()?;
        Ok(written)
    }

    pub fn delete_files(&self, working_dir: &str, file_paths: &[String]) -> Result<usize> {
        let mut wtxn = self.env.write_txn()?;
        let mut deleted = 0;
        for file_path in file_paths {
            deleted += lmdb::delete_prefix(self.symbols, &mut wtxn, &lmdb::file_prefix(working_dir, file_path))?;
        }
        wtxn.commit()?;
        Ok(deleted)
    }

    pub fn delete_working_dir(&self, working_dir: &str) -> Result<usize> {
        let mut wtxn = self.env.write_txn()?;
        let deleted = lmdb::delete_prefix(self.symbols, &mut wtxn, &lmdb::dir_prefix(working_dir))?;
        wtxn.commit()?;
        Ok(deleted)
    }

    /// Visit every symbol of a working directory
    pub fn for_each<F>(&self, working_dir: &str, mut visit: F) -> Result<()>
    where
        F: FnMut(SymbolInfo),
    {
        let rtxn = self.env.read_txn()?;
        for row in self.symbols.prefix_iter(&rtxn, &lmdb::dir_prefix(working_dir))? {
            let (_, record) = row?;
            // Prefix hashes can collide in theory
            if record.working_dir == working_dir {
                visit(record.symbol);
            }
        }
        Ok(())
    }

    /// (symbols, files, working directories)
    pub fn stats(&self) -> Result<(u64, u64, u64)> {
        let rtxn = self.env.read_txn()?;
        lmdb::key_stats(self.symbols, &rtxn)
    }

    pub fn sync(&self) -> Result<()> {
        self.env.force_sync()?;
        Ok(())
    }
}
