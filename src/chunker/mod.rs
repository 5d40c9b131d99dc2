use crate::config::ChunkingConfig;
use crate::file::{Language, LanguageFamily};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

mod boundary;
mod classify;

pub use boundary::{is_block_start, is_markdown_heading};
pub use classify::classify;

/// A located segment of a file that is indexed and retrieved as one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable id derived from path, line span and content hash
    pub id: String,

    /// File path this chunk belongs to
    pub file_path: String,

    /// Exact bytes `start_byte..end_byte` of the source
    pub content: String,

    /// First line, 1-based
    pub start_line: usize,

    /// Last line, 1-based and inclusive
    pub end_line: usize,

    pub start_byte: usize,

    /// Exclusive
    pub end_byte: usize,

    pub language: Language,

    /// Advisory classification
    pub chunk_type: ChunkType,

    /// SHA-256 of `content`, hex encoded
    pub content_hash: String,
}

impl Chunk {
    /// Compute SHA-256 hash of content
    pub fn compute_hash(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Deterministic id, so re-indexing an unchanged file reproduces it
    pub fn compute_id(file_path: &str, start_line: usize, end_line: usize, content_hash: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(file_path.as_bytes());
        hasher.update([0]);
        hasher.update(start_line.to_le_bytes());
        hasher.update(end_line.to_le_bytes());
        hasher.update(content_hash.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        digest[..32].to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Function,
    Class,
    Comment,
    Test,
    Code,
    Documentation,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Comment => "comment",
            Self::Test => "test",
            Self::Code => "code",
            Self::Documentation => "documentation",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "function" => Self::Function,
            "class" => Self::Class,
            "comment" => Self::Comment,
            "test" => Self::Test,
            "documentation" => Self::Documentation,
            _ => Self::Code,
        }
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a language is segmented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    /// Block-start heuristics with size overlap
    Code,
    /// Heading boundaries with size overlap
    Markdown,
    /// Blank-line paragraphs, no overlap
    Paragraph,
}

/// One source line with its byte offset
struct Line<'a> {
    text: &'a str,
    start: usize,
}

/// Line-scanning chunker with boundary heuristics and overlap on size cuts
#[derive(Debug, Clone)]
pub struct Chunker {
    max_chunk_size: usize,
    min_chunk_size: usize,
    overlap_size: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(&ChunkingConfig::default())
    }
}

impl Chunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            max_chunk_size: config.max_chunk_size.max(1),
            min_chunk_size: config.min_chunk_size,
            overlap_size: config.overlap_size.min(config.max_chunk_size.saturating_sub(1)),
        }
    }

    /// Chunk a file, detecting its language from the path
    pub fn chunk_file(&self, path: &Path, content: &str) -> Vec<Chunk> {
        let language = Language::from_path(path);
        self.chunk(&path.to_string_lossy(), content, language)
    }

    /// Chunk free-standing text in a known language
    pub fn chunk_text(&self, text: &str, language: Language) -> Vec<Chunk> {
        self.chunk("", text, language)
    }

    fn chunk(&self, file_path: &str, content: &str, language: Language) -> Vec<Chunk> {
        if content.trim().chars().count() < self.min_chunk_size.max(1) {
            return Vec::new();
        }

        let lines = split_lines(content);
        let strategy = match language {
            Language::Markdown => Strategy::Markdown,
            _ if language.family() == LanguageFamily::Code => Strategy::Code,
            _ => Strategy::Paragraph,
        };

        self.segment(&lines, language, strategy)
            .into_iter()
            .filter_map(|(first, end)| {
                let start_byte = lines[first].start;
                let last = &lines[end - 1];
                let end_byte = last.start + last.text.len();
                let text = &content[start_byte..end_byte];
                if text.trim().is_empty() {
                    return None;
                }

                let content_hash = Chunk::compute_hash(text);
                Some(Chunk {
                    id: Chunk::compute_id(file_path, first + 1, end, &content_hash),
                    file_path: file_path.to_string(),
                    content: text.to_string(),
                    start_line: first + 1,
                    end_line: end,
                    start_byte,
                    end_byte,
                    language,
                    chunk_type: classify(language, file_path, text),
                    content_hash,
                })
            })
            .collect()
    }

    /// Split lines into `[first, end)` ranges of line indices
    fn segment(&self, lines: &[Line<'_>], language: Language, strategy: Strategy) -> Vec<(usize, usize)> {
        let n = lines.len();
        let mut cum = Vec::with_capacity(n + 1);
        cum.push(0usize);
        for line in lines {
            cum.push(cum[cum.len() - 1] + line.text.chars().count());
        }
        let size = |a: usize, b: usize| cum[b] - cum[a];

        let fenced = fenced_lines(lines, strategy);
        let overlap = if strategy == Strategy::Paragraph { 0 } else { self.overlap_size };

        let mut ranges = Vec::new();
        // Lines `start..seed_end` are overlap carried from the previous chunk.
        let mut start = 0;
        let mut seed_end = 0;

        for idx in 0..n {
            if idx > start && is_boundary(lines, &fenced, idx, language, strategy) {
                let lo = start.max(seed_end);
                let cut = if strategy == Strategy::Code {
                    attach_leading_decorations(lines, language, lo, idx)
                } else {
                    idx
                };
                if cut > start && size(start, cut) >= self.min_chunk_size {
                    if cut > seed_end {
                        ranges.push((start, cut));
                    }
                    start = cut;
                    seed_end = cut;
                }
            }

            if size(start, idx + 1) >= self.max_chunk_size {
                ranges.push((start, idx + 1));
                let next = idx + 1;
                start = if overlap > 0 && next < n {
                    overlap_start(&cum, start, next, overlap)
                } else {
                    next
                };
                seed_end = next;
            }
        }

        if n > seed_end {
            ranges.push((start, n));
        }
        ranges
    }
}

fn split_lines(content: &str) -> Vec<Line<'_>> {
    let mut offset = 0;
    content
        .split_inclusive('\n')
        .map(|text| {
            let line = Line { text, start: offset };
            offset += text.len();
            line
        })
        .collect()
}

/// Markdown fences, so `#` comments inside code samples are not headings
fn fenced_lines(lines: &[Line<'_>], strategy: Strategy) -> Vec<bool> {
    if strategy != Strategy::Markdown {
        return vec![false; lines.len()];
    }
    let mut inside = false;
    lines
        .iter()
        .map(|line| {
            let is_fence = line.text.trim_start().starts_with("```");
            let fenced = inside || is_fence;
            if is_fence {
                inside = !inside;
            }
            fenced
        })
        .collect()
}

fn is_boundary(lines: &[Line<'_>], fenced: &[bool], idx: usize, language: Language, strategy: Strategy) -> bool {
    let text = lines[idx].text;
    match strategy {
        Strategy::Code => is_block_start(language, text),
        Strategy::Markdown => !fenced[idx] && is_markdown_heading(text),
        Strategy::Paragraph => !text.trim().is_empty() && lines[idx - 1].text.trim().is_empty(),
    }
}

/// Move a cut above doc comments and attributes that introduce the next block
fn attach_leading_decorations(lines: &[Line<'_>], language: Language, lo: usize, idx: usize) -> usize {
    let mut cut = idx;
    while cut > lo && boundary::is_leading_decoration(language, lines[cut - 1].text) {
        cut -= 1;
    }
    cut
}

/// First line of the overlap tail: the longest suffix of `start..next` that
/// fits in `overlap` characters, never the whole chunk
fn overlap_start(cum: &[usize], start: usize, next: usize, overlap: usize) -> usize {
    let mut tail = next;
    while tail > start + 1 && cum[next] - cum[tail - 1] <= overlap {
        tail -= 1;
    }
    tail
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chunker(max: usize, min: usize, overlap: usize) -> Chunker {
        Chunker::new(&ChunkingConfig {
            max_chunk_size: max,
            min_chunk_size: min,
            overlap_size: overlap,
        })
    }

    fn assert_located(content: &str, chunks: &[Chunk]) {
        let total_lines = content.lines().count();
        for chunk in chunks {
            assert!(chunk.start_line >= 1);
            assert!(chunk.start_line <= chunk.end_line);
            assert!(chunk.end_line <= total_lines);
            assert_eq!(&content[chunk.start_byte..chunk.end_byte], chunk.content);
            assert_eq!(chunk.content_hash, Chunk::compute_hash(&chunk.content));
        }
    }

    const GO_SOURCE: &str = "package main\n\nimport \"fmt\"\n\n// main prints a greeting.\nfunc main() {\n\tfmt.Println(\"hello\")\n}\n\nfunc helper() error {\n\treturn nil\n}\n";

    #[test]
    fn test_go_functions_split_at_block_starts() {
        let chunks = chunker(1500, 10, 200).chunk_file(Path::new("main.go"), GO_SOURCE);
        assert_located(GO_SOURCE, &chunks);

        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].content.starts_with("package main"));
        // The doc comment travels with its function
        assert!(chunks[1].content.starts_with("// main prints"));
        assert_eq!(chunks[1].start_line, 5);
        assert_eq!(chunks[1].chunk_type, ChunkType::Function);
        assert!(chunks[2].content.starts_with("func helper"));
        assert_eq!(chunks[2].end_line, 12);
    }

    #[test]
    fn test_chunks_reconstruct_content_without_overlap() {
        let chunks = chunker(1500, 10, 0).chunk_file(Path::new("main.go"), GO_SOURCE);
        let joined: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(joined, GO_SOURCE);
    }

    #[test]
    fn test_oversized_chunks_carry_overlap() {
        let content: String = (0..40).map(|i| format!("    let value_{i} = compute({i});\n")).collect();
        let chunks = chunker(300, 10, 80).chunk_text(&content, Language::Rust);
        assert_located(&content, &chunks);
        assert!(chunks.len() > 1);

        for pair in chunks.windows(2) {
            // Next chunk starts inside the previous one, on a line boundary
            assert!(pair[1].start_line <= pair[0].end_line);
            assert!(pair[1].start_line > pair[0].start_line);
            let overlap_lines = pair[0].end_line + 1 - pair[1].start_line;
            assert!(overlap_lines >= 1);
        }
        assert_eq!(chunks.last().unwrap().end_line, 40);
    }

    #[test]
    fn test_line_longer_than_max_is_kept_whole() {
        let long = "x".repeat(500);
        let content = format!("{long}\nshort line\n");
        let chunks = chunker(100, 1, 20).chunk_text(&content, Language::Python);
        assert_located(&content, &chunks);
        assert_eq!(chunks[0].content, format!("{long}\n"));
        assert_eq!(chunks.last().unwrap().end_line, 2);
    }

    #[test]
    fn test_markdown_headings() {
        let content = "# Title\n\nIntro text here.\n\n## Install\n\n```sh\n# not a heading\ncargo install\n```\n\n## Usage\n\nRun it.\n";
        let chunks = chunker(1500, 5, 100).chunk_file(Path::new("README.md"), content);
        assert_located(content, &chunks);

        let starts: Vec<_> = chunks.iter().map(|c| c.start_line).collect();
        assert_eq!(starts, vec![1, 5, 12]);
        assert!(chunks.iter().all(|c| c.chunk_type == ChunkType::Documentation));
    }

    #[test]
    fn test_text_paragraphs_without_overlap() {
        let content = "First paragraph line one.\nline two.\n\nSecond paragraph.\n\nThird one here.\n";
        let chunks = chunker(1500, 5, 100).chunk_file(Path::new("notes.txt"), content);
        assert_located(content, &chunks);

        assert_eq!(chunks.len(), 3);
        let joined: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(joined, content);
    }

    #[test]
    fn test_below_minimum_yields_nothing() {
        let c = chunker(1500, 10, 100);
        assert!(c.chunk_text("", Language::Go).is_empty());
        assert!(c.chunk_text("   \n\n", Language::Go).is_empty());
        assert!(c.chunk_text("x := 1", Language::Go).is_empty());
    }

    #[test]
    fn test_rechunking_is_deterministic() {
        let c = Chunker::default();
        let a = c.chunk_file(Path::new("src/main.go"), GO_SOURCE);
        let b = c.chunk_file(Path::new("src/main.go"), GO_SOURCE);
        assert_eq!(a, b);

        let ids: Vec<_> = a.iter().map(|c| c.id.clone()).collect();
        let mut unique = ids.clone();
        unique.dedup();
        assert_eq!(ids, unique);
    }

    #[test]
    fn test_multibyte_offsets() {
        let content = "// héllo wörld\nfn one() {}\n\nfn two() { let s = \"日本語\"; }\n";
        let chunks = chunker(1500, 5, 50).chunk_file(Path::new("lib.rs"), content);
        assert_located(content, &chunks);
        assert_eq!(chunks.len(), 2);
    }
}
