//! Tree-sitter symbol extraction.
//!
//! Parses a source file with its compiled-in grammar and walks the AST,
//! emitting one [`SymbolInfo`] per declaration together with the file's
//! imports and any syntax errors the parser recovered from.

mod extractor;
mod grammar;

pub use extractor::{get_extractor, LanguageExtractor};
pub use grammar::GrammarManager;

use crate::file::Language;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;
use tree_sitter::{Node, Parser};

/// Syntax errors recorded per file before giving up on listing them
const MAX_REPORTED_ERRORS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Struct,
    Interface,
    Variable,
    Constant,
    Type,
    Field,
    Package,
    Module,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Class => "class",
            SymbolKind::Struct => "struct",
            SymbolKind::Interface => "interface",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::Type => "type",
            SymbolKind::Field => "field",
            SymbolKind::Package => "package",
            SymbolKind::Module => "module",
        }
    }

    /// Kinds that other symbols can be attached to as children
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            SymbolKind::Class | SymbolKind::Struct | SymbolKind::Interface | SymbolKind::Type
        )
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named declaration with its location (1-based lines and columns)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: String,
    pub kind: SymbolKind,
    pub file_path: String,
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
    pub language: Language,
    pub signature: Option<String>,
    pub doc_string: Option<String>,
    pub parent: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseResult {
    pub symbols: Vec<SymbolInfo>,
    pub imports: Vec<String>,
    pub errors: Vec<String>,
}

impl ParseResult {
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty() && self.imports.is_empty()
    }
}

/// Extracts symbols from a single file
pub trait SymbolParser: Send + Sync {
    fn parse_file(&self, path: &Path, content: &str) -> ParseResult;

    fn supports(&self, language: Language) -> bool;
}

/// Grammar-backed parser for the languages with compiled-in grammars
pub struct TreeSitterParser {
    grammars: GrammarManager,
}

impl TreeSitterParser {
    pub fn new() -> Self {
        Self {
            grammars: GrammarManager::new(),
        }
    }

    /// Parse `content` as `language`, ignoring the file extension
    pub fn parse_as(&self, language: Language, file_path: &str, content: &str) -> ParseResult {
        let (Some(extractor), Some(grammar)) =
            (get_extractor(language), self.grammars.get_grammar(language))
        else {
            return ParseResult::default();
        };

        // tree_sitter::Parser is not Sync, so each call gets its own
        let mut parser = Parser::new();
        if let Err(e) = parser.set_language(&grammar) {
            return ParseResult {
                errors: vec![format!("failed to load {} grammar: {}", language.name(), e)],
                ..Default::default()
            };
        }
        let Some(tree) = parser.parse(content, None) else {
            return ParseResult {
                errors: vec!["parser returned no tree".to_string()],
                ..Default::default()
            };
        };

        let mut walk = SymbolWalk {
            extractor: extractor.as_ref(),
            source: content.as_bytes(),
            file_path,
            language,
            result: ParseResult::default(),
            detached: Vec::new(),
        };
        walk.visit(tree.root_node(), None);
        walk.link_detached();

        debug!(
            "Parsed {}: {} symbols, {} imports, {} errors",
            file_path,
            walk.result.symbols.len(),
            walk.result.imports.len(),
            walk.result.errors.len()
        );
        walk.result
    }
}

impl Default for TreeSitterParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolParser for TreeSitterParser {
    fn parse_file(&self, path: &Path, content: &str) -> ParseResult {
        let language = Language::from_path(path);
        self.parse_as(language, &path.to_string_lossy(), content)
    }

    fn supports(&self, language: Language) -> bool {
        self.grammars.is_supported(language)
    }
}

/// Enclosing named scope during the walk; `index` is set when the scope is itself a symbol
struct Scope {
    name: String,
    index: Option<usize>,
}

struct SymbolWalk<'a> {
    extractor: &'a dyn LanguageExtractor,
    source: &'a [u8],
    file_path: &'a str,
    language: Language,
    result: ParseResult,
    /// Symbols whose parent is not their syntactic ancestor
    detached: Vec<usize>,
}

impl SymbolWalk<'_> {
    fn visit(&mut self, node: Node, scope: Option<&Scope>) {
        if node.is_error() || node.is_missing() {
            self.record_error(node);
        }

        if self.extractor.import_types().contains(&node.kind()) {
            if let Some(import) = self.extractor.extract_import(node, self.source) {
                self.result.imports.push(import);
            }
            return;
        }

        let mut own_scope = None;
        if self.extractor.is_definition(node) {
            if let Some(name) = self.extractor.extract_name(node, self.source) {
                let index = self.push_symbol(node, name.clone(), scope);
                own_scope = Some(Scope {
                    name,
                    index: Some(index),
                });
            }
        } else if let Some(name) = self.extractor.scope_name(node, self.source) {
            own_scope = Some(Scope { name, index: None });
        }

        let scope = own_scope.as_ref().or(scope);
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.visit(child, scope);
        }
    }

    fn push_symbol(&mut self, node: Node, name: String, scope: Option<&Scope>) -> usize {
        let explicit = self.extractor.explicit_parent(node, self.source);
        let index = self.result.symbols.len();

        match (&explicit, scope) {
            (None, Some(Scope { index: Some(parent), .. })) => {
                self.result.symbols[*parent].children.push(name.clone());
            }
            (Some(_), _) | (None, Some(Scope { index: None, .. })) => self.detached.push(index),
            (None, None) => {}
        }

        let start = node.start_position();
        let end = node.end_position();
        self.result.symbols.push(SymbolInfo {
            name,
            kind: self.extractor.classify(node),
            file_path: self.file_path.to_string(),
            start_line: start.row + 1,
            start_column: start.column + 1,
            end_line: end.row + 1,
            end_column: end.column + 1,
            language: self.language,
            signature: self.extractor.extract_signature(node, self.source),
            doc_string: self.extractor.extract_docstring(node, self.source),
            parent: explicit.or_else(|| scope.map(|s| s.name.clone())),
            children: Vec::new(),
        });
        index
    }

    /// Attach methods declared outside their type (impl blocks, Go receivers)
    fn link_detached(&mut self) {
        for child in std::mem::take(&mut self.detached) {
            let Some(parent_name) = self.result.symbols[child].parent.clone() else {
                continue;
            };
            let child_name = self.result.symbols[child].name.clone();
            if let Some(owner) = self
                .result
                .symbols
                .iter_mut()
                .find(|s| s.name == parent_name && s.kind.is_container())
            {
                owner.children.push(child_name);
            }
        }
    }

    fn record_error(&mut self, node: Node) {
        if self.result.errors.len() >= MAX_REPORTED_ERRORS {
            return;
        }
        let pos = node.start_position();
        let what = if node.is_missing() {
            format!("missing {}", node.kind())
        } else {
            "syntax error".to_string()
        };
        self.result
            .errors
            .push(format!("{} at line {}:{}", what, pos.row + 1, pos.column + 1));
    }
}
