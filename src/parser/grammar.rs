use crate::file::Language;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;
use tree_sitter::Language as TsLanguage;

/// Compiled-in tree-sitter grammars, loaded lazily and cached per language
pub struct GrammarManager {
    grammars: DashMap<Language, Arc<TsLanguage>>,
}

impl GrammarManager {
    pub fn new() -> Self {
        Self {
            grammars: DashMap::new(),
        }
    }

    /// Get a grammar for the given language, or None when none is compiled in
    pub fn get_grammar(&self, language: Language) -> Option<Arc<TsLanguage>> {
        if let Some(grammar) = self.grammars.get(&language) {
            return Some(grammar.clone());
        }

        let grammar = Arc::new(Self::load_grammar(language)?);
        self.grammars.insert(language, grammar.clone());
        debug!("Loaded grammar for {}", language.name());
        Some(grammar)
    }

    fn load_grammar(language: Language) -> Option<TsLanguage> {
        match language {
            Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
            _ => None,
        }
    }

    /// Check if a language has tree-sitter support
    pub fn is_supported(&self, language: Language) -> bool {
        language.supports_tree_sitter()
    }

    pub fn cached_grammars(&self) -> usize {
        self.grammars.len()
    }
}

impl Default for GrammarManager {
    fn default() -> Self {
        Self::new()
    }
}
