pub mod cache;
pub mod chunker;
pub mod cli;
pub mod config;
pub mod embed;
pub mod engine;
pub mod error;
pub mod file;
pub mod fts;
pub mod index;
pub mod output;
pub mod parser;
pub mod rerank;
pub mod search;
pub mod symbols;
pub mod vectordb;
pub mod watch;

// Re-export commonly used types
pub use chunker::{Chunk, ChunkType, Chunker};
pub use config::Config;
pub use engine::Engine;
pub use error::{IndexError, Result};
pub use file::{FileInfo, FileWalker, Language, WalkStats};
pub use index::{Index, IndexChanges, IndexManager, IndexStatus, IndexTag, SearchOptions, SearchResult, SearchType};
pub use search::{HybridRetriever, RetrievalRequest, RetrievalResult, Retriever};
