use crate::error::Result;
use crate::file::{Language, LanguageFamily};
use crate::index::SearchResult;
use std::path::Path;

/// Rescoring applied to merged results
pub trait Reranker: Send + Sync {
    fn rerank(&self, query: &str, results: Vec<SearchResult>) -> Result<Vec<SearchResult>>;
}

/// Weights for exact/prefix/substring matches of file and symbol names
const EXACT_NAME: f32 = 1.0;
const PREFIX_NAME: f32 = 0.6;
const SUBSTRING_NAME: f32 = 0.3;

const CONTENT_MATCH: f32 = 0.2;
const SNIPPET_MATCH: f32 = 0.1;

const CODE_FILE: f32 = 0.15;
const MARKUP_FILE: f32 = 0.08;
const TEXT_FILE: f32 = 0.03;

/// Blends a lexical relevance heuristic into the retriever score
///
/// `score' = (2 * heuristic + score) / 3`, followed by a stable sort.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicReranker;

impl HeuristicReranker {
    pub fn new() -> Self {
        Self
    }

    /// Relevance of `result` for an already lowercased query
    pub fn heuristic(&self, query: &str, result: &SearchResult) -> f32 {
        let path = Path::new(&result.file_path);
        let mut score = 0.0;

        if !query.is_empty() {
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("")
                .to_lowercase();
            let stem = path
                .file_stem()
                .and_then(|n| n.to_str())
                .unwrap_or("")
                .to_lowercase();
            score += if file_name == query || stem == query {
                EXACT_NAME
            } else {
                name_tier(&file_name, query)
            };

            if result.content.to_lowercase().contains(query) {
                score += CONTENT_MATCH;
            }
            if result.snippet.to_lowercase().contains(query) {
                score += SNIPPET_MATCH;
            }
            if let Some(symbol) = &result.symbol_info {
                score += name_tier(&symbol.name.to_lowercase(), query);
            }
        }

        score += match Language::from_path(path).family() {
            LanguageFamily::Code => CODE_FILE,
            LanguageFamily::Markup => MARKUP_FILE,
            LanguageFamily::Text => TEXT_FILE,
        };
        score
    }
}

fn name_tier(name: &str, query: &str) -> f32 {
    if name == query {
        EXACT_NAME
    } else if name.starts_with(query) {
        PREFIX_NAME
    } else if name.contains(query) {
        SUBSTRING_NAME
    } else {
        0.0
    }
}

impl Reranker for HeuristicReranker {
    fn rerank(&self, query: &str, mut results: Vec<SearchResult>) -> Result<Vec<SearchResult>> {
        if results.is_empty() {
            return Ok(results);
        }
        let query = query.trim().to_lowercase();
        for result in &mut results {
            let heuristic = self.heuristic(&query, result);
            result.score = (2.0 * heuristic + result.score) / 3.0;
        }
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SearchType;
    use crate::parser::{SymbolInfo, SymbolKind};
    use pretty_assertions::assert_eq;

    fn result(path: &str, content: &str, score: f32) -> SearchResult {
        SearchResult::new(path, 1, 1, content, score, SearchType::FullText)
    }

    #[test]
    fn test_empty_input_unchanged() {
        let out = HeuristicReranker::new().rerank("anything", Vec::new()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_filename_tiers() {
        let reranker = HeuristicReranker::new();
        let exact = reranker.heuristic("config", &result("/w/config.rs", "", 0.0));
        let prefix = reranker.heuristic("config", &result("/w/config_loader.rs", "", 0.0));
        let substring = reranker.heuristic("config", &result("/w/app_config_test.rs", "", 0.0));
        assert!(exact > prefix);
        assert!(prefix > substring);
        assert!((exact - (EXACT_NAME + CODE_FILE)).abs() < 1e-6);
    }

    #[test]
    fn test_extension_preference() {
        let reranker = HeuristicReranker::new();
        let code = reranker.heuristic("", &result("/w/a.go", "", 0.0));
        let markup = reranker.heuristic("", &result("/w/a.md", "", 0.0));
        let text = reranker.heuristic("", &result("/w/a.txt", "", 0.0));
        assert!(code > markup && markup > text);
    }

    #[test]
    fn test_content_and_symbol_matches() {
        let reranker = HeuristicReranker::new();
        let plain = result("/w/a.rs", "fn other() {}", 0.0);
        let content = result("/w/a.rs", "fn load() {}", 0.0);
        let mut symbol = content.clone();
        symbol.symbol_info = Some(SymbolInfo {
            name: "load".into(),
            kind: SymbolKind::Function,
            file_path: "/w/a.rs".into(),
            start_line: 1,
            start_column: 1,
            end_line: 1,
            end_column: 13,
            language: Language::Rust,
            signature: None,
            doc_string: None,
            parent: None,
            children: Vec::new(),
        });

        let base = reranker.heuristic("load", &plain);
        let with_content = reranker.heuristic("load", &content);
        // content and snippet are the same text here
        assert!((with_content - base - CONTENT_MATCH - SNIPPET_MATCH).abs() < 1e-6);
        assert!((reranker.heuristic("load", &symbol) - with_content - EXACT_NAME).abs() < 1e-6);
    }

    #[test]
    fn test_blend_and_stable_order() {
        let results = vec![
            result("/w/readme.txt", "nothing", 0.9),
            result("/w/b.go", "nothing", 0.3),
            result("/w/a.go", "nothing", 0.3),
        ];
        let out = HeuristicReranker::new().rerank("zzz", results).unwrap();
        let paths: Vec<&str> = out.iter().map(|r| r.file_path.as_str()).collect();
        // (2*0.03 + 0.9)/3 = 0.32 ; (2*0.15 + 0.3)/3 = 0.2
        assert_eq!(paths, vec!["/w/readme.txt", "/w/b.go", "/w/a.go"]);
        assert!((out[0].score - 0.32).abs() < 1e-6);
        assert!((out[1].score - 0.2).abs() < 1e-6);
    }
}
