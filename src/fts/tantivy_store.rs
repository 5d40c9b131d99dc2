//! Tantivy-backed chunk store
//!
//! One document per chunk. Documents carry the working directory and a
//! combined file key so a file or a whole working directory can be dropped
//! with a single delete term.

use crate::chunker::{Chunk, ChunkType};
use crate::error::{IndexError, Result};
use crate::file::Language;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use tantivy::{
    collector::{DocSetCollector, TopDocs},
    directory::MmapDirectory,
    query::{BooleanQuery, Occur, Query, QueryParser, TermQuery},
    schema::{Field, IndexRecordOption, NumericOptions, Schema, Value, STORED, STRING, TEXT},
    Index, IndexReader, IndexSettings, IndexWriter, TantivyDocument, Term,
};

/// Writer heap budget
const WRITER_HEAP_BYTES: usize = 50_000_000;

/// A chunk matched by a full-text query
#[derive(Debug, Clone)]
pub struct FtsHit {
    pub chunk_id: String,
    pub file_path: String,
    pub content: String,
    pub content_hash: String,
    pub start_line: usize,
    pub end_line: usize,
    pub start_byte: usize,
    pub end_byte: usize,
    pub language: Language,
    pub chunk_type: ChunkType,
    pub file_size: u64,
    pub indexed_at: i64,
    /// Raw BM25 score from tantivy
    pub bm25: f32,
}

#[derive(Clone, Copy)]
struct Fields {
    chunk_id: Field,
    file_key: Field,
    working_dir: Field,
    file_path: Field,
    content: Field,
    content_hash: Field,
    start_line: Field,
    end_line: Field,
    start_byte: Field,
    end_byte: Field,
    language: Field,
    chunk_type: Field,
    file_size: Field,
    indexed_at: Field,
}

impl Fields {
    fn schema() -> (Schema, Fields) {
        let mut builder = Schema::builder();
        let stored_u64 = || NumericOptions::default().set_stored();

        let fields = Fields {
            chunk_id: builder.add_text_field("chunk_id", STRING | STORED),
            // "{working_dir}\0{file_path}", indexed only for deletion
            file_key: builder.add_text_field("file_key", STRING),
            working_dir: builder.add_text_field("working_dir", STRING | STORED),
            file_path: builder.add_text_field("file_path", STRING | STORED),
            content: builder.add_text_field("content", TEXT | STORED),
            content_hash: builder.add_text_field("content_hash", STORED),
            start_line: builder.add_u64_field("start_line", stored_u64()),
            end_line: builder.add_u64_field("end_line", stored_u64()),
            start_byte: builder.add_u64_field("start_byte", stored_u64()),
            end_byte: builder.add_u64_field("end_byte", stored_u64()),
            language: builder.add_text_field("language", STRING | STORED),
            chunk_type: builder.add_text_field("chunk_type", STRING | STORED),
            file_size: builder.add_u64_field("file_size", stored_u64()),
            indexed_at: builder.add_i64_field("indexed_at", NumericOptions::default().set_stored()),
        };
        (builder.build(), fields)
    }

    fn from_schema(schema: &Schema) -> Result<Fields> {
        let get = |name: &str| {
            schema
                .get_field(name)
                .map_err(|_| IndexError::Config(format!("full-text store is missing field {}", name)))
        };
        Ok(Fields {
            chunk_id: get("chunk_id")?,
            file_key: get("file_key")?,
            working_dir: get("working_dir")?,
            file_path: get("file_path")?,
            content: get("content")?,
            content_hash: get("content_hash")?,
            start_line: get("start_line")?,
            end_line: get("end_line")?,
            start_byte: get("start_byte")?,
            end_byte: get("end_byte")?,
            language: get("language")?,
            chunk_type: get("chunk_type")?,
            file_size: get("file_size")?,
            indexed_at: get("indexed_at")?,
        })
    }
}

/// Full-text chunk store using Tantivy
///
/// Readers never take the writer lock, so searches see the last commit
/// while an update is still running.
pub struct FtsStore {
    index: Index,
    reader: IndexReader,
    writer: Mutex<Option<IndexWriter>>,
    fields: Fields,
}

impl FtsStore {
    /// Create or open the store in `dir`
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;

        let (index, fields) = if dir.join("meta.json").exists() {
            let index = Index::open_in_dir(dir)?;
            let fields = Fields::from_schema(&index.schema())?;
            (index, fields)
        } else {
            let (schema, fields) = Fields::schema();
            let mmap = MmapDirectory::open(dir)
                .map_err(|e| IndexError::Other(anyhow::anyhow!("failed to open {}: {}", dir.display(), e)))?;
            (Index::create(mmap, schema, IndexSettings::default())?, fields)
        };

        let reader = index.reader()?;
        Ok(Self {
            index,
            reader,
            writer: Mutex::new(None),
            fields,
        })
    }

    /// Run `op` against the writer, opening it on first use
    fn with_writer<T>(&self, op: impl FnOnce(&mut IndexWriter) -> Result<T>) -> Result<T> {
        let mut guard = self.writer.lock().map_err(|_| IndexError::LockPoisoned)?;
        if guard.is_none() {
            *guard = Some(self.index.writer(WRITER_HEAP_BYTES)?);
        }
        match guard.as_mut() {
            Some(writer) => op(writer),
            None => Err(IndexError::Other(anyhow::anyhow!("full-text writer unavailable"))),
        }
    }

    fn file_key(working_dir: &str, file_path: &str) -> String {
        format!("{}\0{}", working_dir, file_path)
    }

    /// Drop every chunk of `file_path`, then add `chunks`; visible together at the next commit
    pub fn replace_file(
        &self,
        working_dir: &str,
        file_path: &str,
        chunks: &[Chunk],
        file_size: u64,
        indexed_at: i64,
    ) -> Result<()> {
        let f = self.fields;
        let key = Self::file_key(working_dir, file_path);
        self.with_writer(|writer| {
            writer.delete_term(Term::from_field_text(f.file_key, &key));
            for chunk in chunks {
                let mut doc = TantivyDocument::new();
                doc.add_text(f.chunk_id, &chunk.id);
                doc.add_text(f.file_key, &key);
                doc.add_text(f.working_dir, working_dir);
                doc.add_text(f.file_path, file_path);
                doc.add_text(f.content, &chunk.content);
                doc.add_text(f.content_hash, &chunk.content_hash);
                doc.add_u64(f.start_line, chunk.start_line as u64);
                doc.add_u64(f.end_line, chunk.end_line as u64);
                doc.add_u64(f.start_byte, chunk.start_byte as u64);
                doc.add_u64(f.end_byte, chunk.end_byte as u64);
                doc.add_text(f.language, chunk.language.id());
                doc.add_text(f.chunk_type, chunk.chunk_type.as_str());
                doc.add_u64(f.file_size, file_size);
                doc.add_i64(f.indexed_at, indexed_at);
                writer.add_document(doc)?;
            }
            Ok(())
        })
    }

    /// Delete all chunks for a file path
    pub fn delete_file(&self, working_dir: &str, file_path: &str) -> Result<()> {
        let term = Term::from_field_text(self.fields.file_key, &Self::file_key(working_dir, file_path));
        self.with_writer(|writer| {
            writer.delete_term(term);
            Ok(())
        })
    }

    /// Delete every chunk of a working directory
    pub fn delete_working_dir(&self, working_dir: &str) -> Result<()> {
        let term = Term::from_field_text(self.fields.working_dir, working_dir);
        self.with_writer(|writer| {
            writer.delete_term(term);
            Ok(())
        })
    }

    /// Commit pending changes and reload the reader
    pub fn commit(&self) -> Result<()> {
        let mut guard = self.writer.lock().map_err(|_| IndexError::LockPoisoned)?;
        if let Some(writer) = guard.as_mut() {
            writer.commit()?;
            self.reader.reload()?;
        }
        Ok(())
    }

    /// Conjunctive BM25 search over `terms` within one working directory
    pub fn search(
        &self,
        working_dir: &str,
        terms: &[String],
        languages: &[Language],
        limit: usize,
    ) -> Result<Vec<FtsHit>> {
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let f = self.fields;
        let searcher = self.reader.searcher();

        let mut query_parser = QueryParser::for_index(&self.index, vec![f.content]);
        // Multi-term queries require every term
        query_parser.set_conjunction_by_default();
        let text_query = query_parser.parse_query(&terms.join(" "))?;

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![
            (Occur::Must, text_query),
            (
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(f.working_dir, working_dir),
                    IndexRecordOption::Basic,
                )),
            ),
        ];
        if !languages.is_empty() {
            let any_language: Vec<(Occur, Box<dyn Query>)> = languages
                .iter()
                .map(|lang| {
                    let q: Box<dyn Query> = Box::new(TermQuery::new(
                        Term::from_field_text(f.language, lang.id()),
                        IndexRecordOption::Basic,
                    ));
                    (Occur::Should, q)
                })
                .collect();
            clauses.push((Occur::Must, Box::new(BooleanQuery::new(any_language))));
        }
        let query = BooleanQuery::new(clauses);

        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;
        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            hits.push(self.hit_from_doc(&doc, score));
        }
        Ok(hits)
    }

    fn hit_from_doc(&self, doc: &TantivyDocument, bm25: f32) -> FtsHit {
        let f = self.fields;
        let text = |field: Field| {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        let num = |field: Field| doc.get_first(field).and_then(|v| v.as_u64()).unwrap_or(0);

        FtsHit {
            chunk_id: text(f.chunk_id),
            file_path: text(f.file_path),
            content: text(f.content),
            content_hash: text(f.content_hash),
            start_line: num(f.start_line) as usize,
            end_line: num(f.end_line) as usize,
            start_byte: num(f.start_byte) as usize,
            end_byte: num(f.end_byte) as usize,
            language: Language::from_id(&text(f.language)),
            chunk_type: ChunkType::parse(&text(f.chunk_type)),
            file_size: num(f.file_size),
            indexed_at: doc.get_first(f.indexed_at).and_then(|v| v.as_i64()).unwrap_or(0),
            bm25,
        }
    }

    /// Distinct file paths stored for one working directory
    pub fn files(&self, working_dir: &str) -> Result<HashSet<String>> {
        let f = self.fields;
        let searcher = self.reader.searcher();
        let query = TermQuery::new(
            Term::from_field_text(f.working_dir, working_dir),
            IndexRecordOption::Basic,
        );
        let mut files = HashSet::new();
        for address in searcher.search(&query, &DocSetCollector)? {
            let doc: TantivyDocument = searcher.doc(address)?;
            if let Some(path) = doc.get_first(f.file_path).and_then(|v| v.as_str()) {
                files.insert(path.to_string());
            }
        }
        Ok(files)
    }

    /// Documents, distinct files and distinct working directories
    pub fn stats(&self) -> Result<FtsStats> {
        let f = self.fields;
        let searcher = self.reader.searcher();
        let addresses = searcher.search(&tantivy::query::AllQuery, &DocSetCollector)?;

        let mut files = HashSet::new();
        let mut working_dirs = HashSet::new();
        for address in &addresses {
            let doc: TantivyDocument = searcher.doc(*address)?;
            let dir = doc.get_first(f.working_dir).and_then(|v| v.as_str()).unwrap_or_default();
            let path = doc.get_first(f.file_path).and_then(|v| v.as_str()).unwrap_or_default();
            files.insert(Self::file_key(dir, path));
            working_dirs.insert(dir.to_string());
        }

        Ok(FtsStats {
            num_documents: searcher.num_docs(),
            num_files: files.len() as u64,
            num_working_dirs: working_dirs.len() as u64,
        })
    }

    /// Wait for background merges and release the writer lock
    pub fn close(&self) -> Result<()> {
        let writer = self.writer.lock().map_err(|_| IndexError::LockPoisoned)?.take();
        if let Some(writer) = writer {
            writer.wait_merging_threads()?;
        }
        Ok(())
    }
}

/// Statistics about the FTS index
#[derive(Debug, Clone)]
pub struct FtsStats {
    pub num_documents: u64,
    pub num_files: u64,
    pub num_working_dirs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::Chunker;
    use std::sync::{mpsc, Arc};
    use std::time::Duration;
    use tempfile::tempdir;

    fn chunks(path: &str, content: &str) -> Vec<Chunk> {
        Chunker::default().chunk_file(Path::new(path), content)
    }

    fn terms(query: &str) -> Vec<String> {
        query.split_whitespace().map(str::to_lowercase).collect()
    }

    #[test]
    fn test_fts_basic() -> Result<()> {
        let dir = tempdir()?;
        let store = FtsStore::open(dir.path())?;

        let hello = chunks("/w/src/main.rs", "fn hello_world() {\n    println!(\"Hello!\");\n}\n");
        let config = chunks("/w/src/config.rs", "struct UserConfig {\n    name: String,\n    age: u32,\n}\n");
        store.replace_file("/w", "/w/src/main.rs", &hello, 40, 0)?;
        store.replace_file("/w", "/w/src/config.rs", &config, 50, 0)?;
        store.commit()?;

        let hits = store.search("/w", &terms("hello"), &[], 10)?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_path, "/w/src/main.rs");
        assert_eq!(hits[0].start_line, 1);
        assert!(hits[0].bm25 > 0.0);

        let hits = store.search("/w", &terms("userconfig"), &[], 10)?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].language, Language::Rust);

        Ok(())
    }

    #[test]
    fn test_terms_are_conjunctive() -> Result<()> {
        let dir = tempdir()?;
        let store = FtsStore::open(dir.path())?;
        store.replace_file("/w", "/w/a.txt", &chunks("/w/a.txt", "alpha beta gamma\n"), 1, 0)?;
        store.replace_file("/w", "/w/b.txt", &chunks("/w/b.txt", "alpha delta epsilon\n"), 1, 0)?;
        store.commit()?;

        assert_eq!(store.search("/w", &terms("alpha"), &[], 10)?.len(), 2);
        let both = store.search("/w", &terms("alpha beta"), &[], 10)?;
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].file_path, "/w/a.txt");
        Ok(())
    }

    #[test]
    fn test_replace_and_scoped_delete() -> Result<()> {
        let dir = tempdir()?;
        let store = FtsStore::open(dir.path())?;

        store.replace_file("/w", "/w/a.txt", &chunks("/w/a.txt", "old content here\n"), 1, 0)?;
        store.replace_file("/other", "/other/a.txt", &chunks("/other/a.txt", "old content here\n"), 1, 0)?;
        store.commit()?;

        store.replace_file("/w", "/w/a.txt", &chunks("/w/a.txt", "new content here\n"), 1, 0)?;
        store.commit()?;
        assert!(store.search("/w", &terms("old"), &[], 10)?.is_empty());
        assert_eq!(store.search("/w", &terms("new"), &[], 10)?.len(), 1);
        assert_eq!(store.search("/other", &terms("old"), &[], 10)?.len(), 1);

        store.delete_working_dir("/w")?;
        store.commit()?;
        assert!(store.search("/w", &terms("content"), &[], 10)?.is_empty());
        let stats = store.stats()?;
        assert_eq!(stats.num_files, 1);
        assert_eq!(stats.num_working_dirs, 1);
        Ok(())
    }

    #[test]
    fn test_language_filter_and_zero_limit() -> Result<()> {
        let dir = tempdir()?;
        let store = FtsStore::open(dir.path())?;
        store.replace_file("/w", "/w/a.go", &chunks("/w/a.go", "func run() {\n}\n"), 1, 0)?;
        store.replace_file("/w", "/w/a.py", &chunks("/w/a.py", "def run():\n    pass\n"), 1, 0)?;
        store.commit()?;

        let hits = store.search("/w", &terms("run"), &[Language::Go], 10)?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_path, "/w/a.go");
        assert!(store.search("/w", &terms("run"), &[], 0)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_reopen_keeps_documents() -> Result<()> {
        let dir = tempdir()?;
        {
            let store = FtsStore::open(dir.path())?;
            store.replace_file("/w", "/w/a.txt", &chunks("/w/a.txt", "persisted words\n"), 1, 0)?;
            store.commit()?;
            store.close()?;
        }
        let store = FtsStore::open(dir.path())?;
        assert_eq!(store.search("/w", &terms("persisted"), &[], 10)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_search_does_not_wait_for_writer() -> Result<()> {
        let dir = tempdir()?;
        let store = Arc::new(FtsStore::open(dir.path())?);
        store.replace_file("/w", "/w/a.txt", &chunks("/w/a.txt", "needle in a haystack\n"), 1, 0)?;
        store.commit()?;

        // Stand in for a long-running update holding the writer
        let _writing = store.writer.lock().unwrap();
        let (tx, rx) = mpsc::channel();
        let reader = Arc::clone(&store);
        std::thread::spawn(move || {
            let hits = reader.search("/w", &terms("needle"), &[], 10).map(|h| h.len());
            let stats = reader.stats().map(|s| s.num_files);
            let _ = tx.send((hits, stats));
        });

        let (hits, stats) = rx
            .recv_timeout(Duration::from_secs(10))
            .expect("search waited for the writer lock");
        assert_eq!(hits?, 1);
        assert_eq!(stats?, 1);
        Ok(())
    }
}
