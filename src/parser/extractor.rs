use super::SymbolKind;
use crate::file::Language;
use tree_sitter::Node;

/// Longest signature kept for a symbol
const MAX_SIGNATURE_CHARS: usize = 240;

/// Language-specific symbol extraction
///
/// Each grammar names its declarations differently, so every language gets
/// an extractor that knows which nodes are definitions, how to name and
/// classify them, and where their documentation lives.
pub trait LanguageExtractor: Send + Sync {
    /// AST node kinds that declare a symbol
    fn definition_types(&self) -> &[&'static str];

    /// AST node kinds that are imports
    fn import_types(&self) -> &[&'static str];

    /// Classify a definition node
    fn classify(&self, node: Node) -> SymbolKind;

    /// Extract documentation attached to a definition
    fn extract_docstring(&self, node: Node, source: &[u8]) -> Option<String>;

    /// Extract the imported path or module from an import node
    fn extract_import(&self, node: Node, source: &[u8]) -> Option<String>;

    /// Check if a node declares a symbol
    fn is_definition(&self, node: Node) -> bool {
        self.definition_types().contains(&node.kind())
    }

    /// Extract the name from a definition node
    fn extract_name(&self, node: Node, source: &[u8]) -> Option<String> {
        node.child_by_field_name("name")
            .and_then(|n| n.utf8_text(source).ok())
            .map(String::from)
    }

    /// Declaration header: everything before the body, whitespace collapsed
    fn extract_signature(&self, node: Node, source: &[u8]) -> Option<String> {
        header_signature(node, source)
    }

    /// Name of a non-symbol scope (e.g. a Rust `impl` block) for its children
    fn scope_name(&self, _node: Node, _source: &[u8]) -> Option<String> {
        None
    }

    /// Parent declared outside the syntactic nesting (e.g. Go receivers)
    fn explicit_parent(&self, _node: Node, _source: &[u8]) -> Option<String> {
        None
    }
}

/// Get the appropriate extractor for a language
pub fn get_extractor(language: Language) -> Option<Box<dyn LanguageExtractor>> {
    match language {
        Language::Rust => Some(Box::new(RustExtractor)),
        Language::Python => Some(Box::new(PythonExtractor)),
        Language::JavaScript | Language::TypeScript => Some(Box::new(TypeScriptExtractor)),
        Language::Go => Some(Box::new(GoExtractor)),
        _ => None,
    }
}

fn node_text<'a>(node: Node, source: &'a [u8]) -> Option<&'a str> {
    node.utf8_text(source).ok()
}

fn collapse_whitespace(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > MAX_SIGNATURE_CHARS {
        collapsed.chars().take(MAX_SIGNATURE_CHARS).collect()
    } else {
        collapsed
    }
}

/// Text from the node start up to its body, or its first line when bodiless
pub fn header_signature(node: Node, source: &[u8]) -> Option<String> {
    let end = match node.child_by_field_name("body") {
        Some(body) => body.start_byte(),
        None => {
            let text = node_text(node, source)?;
            node.start_byte() + text.find('\n').unwrap_or(text.len())
        }
    };
    let header = std::str::from_utf8(source.get(node.start_byte()..end)?).ok()?;
    let header = collapse_whitespace(header.trim_end_matches(&['{', ':', ' ', '\t', '\r', '\n'][..]));
    if header.is_empty() {
        None
    } else {
        Some(header)
    }
}

/// Contiguous comment siblings immediately above `node`
fn preceding_comments<F>(node: Node, source: &[u8], comment_kinds: &[&str], accept: F) -> Option<String>
where
    F: Fn(&str) -> bool,
{
    let mut lines = Vec::new();
    let mut expected_row = node.start_position().row;
    let mut current = node.prev_sibling();

    while let Some(prev) = current {
        if !comment_kinds.contains(&prev.kind()) || prev.end_position().row + 1 < expected_row {
            break;
        }
        let text = node_text(prev, source)?;
        if !accept(text) {
            break;
        }
        lines.push(text.trim().to_string());
        expected_row = prev.start_position().row;
        current = prev.prev_sibling();
    }

    if lines.is_empty() {
        return None;
    }
    lines.reverse();
    Some(lines.join("\n"))
}

fn parent_kind_is(node: Node, kinds: &[&str]) -> bool {
    node.parent().map(|p| kinds.contains(&p.kind())).unwrap_or(false)
}

fn strip_quotes(text: &str) -> String {
    text.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
}

/// Rust language extractor
pub struct RustExtractor;

impl LanguageExtractor for RustExtractor {
    fn definition_types(&self) -> &[&'static str] {
        &[
            "function_item",
            "function_signature_item",
            "struct_item",
            "union_item",
            "enum_item",
            "trait_item",
            "type_item",
            "mod_item",
            "const_item",
            "static_item",
            "field_declaration",
        ]
    }

    fn import_types(&self) -> &[&'static str] {
        &["use_declaration"]
    }

    fn classify(&self, node: Node) -> SymbolKind {
        match node.kind() {
            "function_item" | "function_signature_item" => {
                let in_impl = node
                    .parent()
                    .filter(|p| p.kind() == "declaration_list")
                    .and_then(|p| p.parent())
                    .map(|gp| matches!(gp.kind(), "impl_item" | "trait_item"))
                    .unwrap_or(false);
                if in_impl {
                    SymbolKind::Method
                } else {
                    SymbolKind::Function
                }
            }
            "struct_item" | "union_item" => SymbolKind::Struct,
            "trait_item" => SymbolKind::Interface,
            "enum_item" | "type_item" => SymbolKind::Type,
            "mod_item" => SymbolKind::Module,
            "const_item" => SymbolKind::Constant,
            "static_item" => SymbolKind::Variable,
            "field_declaration" => SymbolKind::Field,
            _ => SymbolKind::Variable,
        }
    }

    fn extract_docstring(&self, node: Node, source: &[u8]) -> Option<String> {
        // Attributes sit between doc comments and the item
        let mut anchor = node;
        while let Some(prev) = anchor.prev_sibling() {
            if prev.kind() != "attribute_item" {
                break;
            }
            anchor = prev;
        }
        preceding_comments(anchor, source, &["line_comment", "block_comment"], |text| {
            let t = text.trim_start();
            t.starts_with("///") || t.starts_with("/**")
        })
    }

    fn extract_import(&self, node: Node, source: &[u8]) -> Option<String> {
        node.child_by_field_name("argument")
            .and_then(|arg| node_text(arg, source))
            .map(collapse_whitespace)
    }

    fn scope_name(&self, node: Node, source: &[u8]) -> Option<String> {
        if node.kind() == "impl_item" {
            node.child_by_field_name("type")
                .and_then(|t| node_text(t, source))
                .map(String::from)
        } else {
            None
        }
    }
}

/// Python language extractor
pub struct PythonExtractor;

impl LanguageExtractor for PythonExtractor {
    fn definition_types(&self) -> &[&'static str] {
        &["function_definition", "class_definition"]
    }

    fn import_types(&self) -> &[&'static str] {
        &["import_statement", "import_from_statement"]
    }

    fn classify(&self, node: Node) -> SymbolKind {
        match node.kind() {
            "function_definition" => {
                let in_class = node
                    .parent()
                    .filter(|p| p.kind() == "block")
                    .and_then(|p| p.parent())
                    .map(|gp| gp.kind() == "class_definition")
                    .unwrap_or(false);
                if in_class {
                    SymbolKind::Method
                } else {
                    SymbolKind::Function
                }
            }
            _ => SymbolKind::Class,
        }
    }

    fn extract_docstring(&self, node: Node, source: &[u8]) -> Option<String> {
        // First statement of the body, when it is a string literal
        let body = node.child_by_field_name("body")?;
        let mut cursor = body.walk();
        let first = body.named_children(&mut cursor).next()?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let mut inner = first.walk();
        let string = first
            .named_children(&mut inner)
            .find(|child| child.kind() == "string")?;
        node_text(string, source).map(String::from)
    }

    fn extract_import(&self, node: Node, source: &[u8]) -> Option<String> {
        node_text(node, source).map(collapse_whitespace)
    }
}

/// TypeScript/JavaScript language extractor
pub struct TypeScriptExtractor;

impl LanguageExtractor for TypeScriptExtractor {
    fn definition_types(&self) -> &[&'static str] {
        &[
            "function_declaration",
            "generator_function_declaration",
            "method_definition",
            "class_declaration",
            "abstract_class_declaration",
            "interface_declaration",
            "type_alias_declaration",
            "enum_declaration",
            "variable_declarator",
            "public_field_definition",
            "field_definition",
        ]
    }

    fn import_types(&self) -> &[&'static str] {
        &["import_statement"]
    }

    fn is_definition(&self, node: Node) -> bool {
        if !self.definition_types().contains(&node.kind()) {
            return false;
        }
        if node.kind() != "variable_declarator" {
            return true;
        }
        // Only module-level bindings; locals are noise
        node.parent()
            .and_then(|decl| decl.parent())
            .map(|scope| matches!(scope.kind(), "program" | "export_statement"))
            .unwrap_or(false)
    }

    fn extract_name(&self, node: Node, source: &[u8]) -> Option<String> {
        node.child_by_field_name("name")
            .or_else(|| node.child_by_field_name("property"))
            .and_then(|n| node_text(n, source))
            .map(String::from)
    }

    fn classify(&self, node: Node) -> SymbolKind {
        match node.kind() {
            "function_declaration" | "generator_function_declaration" => SymbolKind::Function,
            "method_definition" => SymbolKind::Method,
            "class_declaration" | "abstract_class_declaration" => SymbolKind::Class,
            "interface_declaration" => SymbolKind::Interface,
            "type_alias_declaration" | "enum_declaration" => SymbolKind::Type,
            "public_field_definition" | "field_definition" => SymbolKind::Field,
            "variable_declarator" => {
                let is_function = node
                    .child_by_field_name("value")
                    .map(|v| matches!(v.kind(), "arrow_function" | "function_expression" | "function"))
                    .unwrap_or(false);
                let is_const = node
                    .parent()
                    .and_then(|decl| decl.child(0))
                    .map(|kw| kw.kind() == "const")
                    .unwrap_or(false);
                if is_function {
                    SymbolKind::Function
                } else if is_const {
                    SymbolKind::Constant
                } else {
                    SymbolKind::Variable
                }
            }
            _ => SymbolKind::Variable,
        }
    }

    fn extract_signature(&self, node: Node, source: &[u8]) -> Option<String> {
        if node.kind() == "variable_declarator" {
            let value = node.child_by_field_name("value")?;
            if matches!(value.kind(), "arrow_function" | "function_expression" | "function") {
                let name = self.extract_name(node, source)?;
                let params = value
                    .child_by_field_name("parameters")
                    .and_then(|p| node_text(p, source))
                    .unwrap_or("()");
                return Some(format!("const {} = {} =>", name, collapse_whitespace(params)));
            }
        }
        header_signature(node, source)
    }

    fn extract_docstring(&self, node: Node, source: &[u8]) -> Option<String> {
        let anchor = match node.kind() {
            "variable_declarator" => node.parent()?,
            _ => node,
        };
        let anchor = if parent_kind_is(anchor, &["export_statement"]) {
            anchor.parent()?
        } else {
            anchor
        };
        preceding_comments(anchor, source, &["comment"], |text| text.trim_start().starts_with("/**"))
    }

    fn extract_import(&self, node: Node, source: &[u8]) -> Option<String> {
        node.child_by_field_name("source")
            .and_then(|s| node_text(s, source))
            .map(strip_quotes)
    }
}

/// Go language extractor
pub struct GoExtractor;

impl LanguageExtractor for GoExtractor {
    fn definition_types(&self) -> &[&'static str] {
        &[
            "package_clause",
            "function_declaration",
            "method_declaration",
            "type_spec",
            "const_spec",
            "var_spec",
            "field_declaration",
        ]
    }

    fn import_types(&self) -> &[&'static str] {
        &["import_spec"]
    }

    fn is_definition(&self, node: Node) -> bool {
        match node.kind() {
            // Only package-level constants and variables
            "const_spec" | "var_spec" => node
                .parent()
                .and_then(|decl| decl.parent())
                .map(|scope| scope.kind() == "source_file")
                .unwrap_or(false),
            kind => self.definition_types().contains(&kind),
        }
    }

    fn extract_name(&self, node: Node, source: &[u8]) -> Option<String> {
        if node.kind() == "package_clause" {
            let mut cursor = node.walk();
            let ident = node
                .named_children(&mut cursor)
                .find(|c| c.kind() == "package_identifier")?;
            return node_text(ident, source).map(String::from);
        }
        node.child_by_field_name("name")
            .and_then(|n| node_text(n, source))
            .map(String::from)
    }

    fn classify(&self, node: Node) -> SymbolKind {
        match node.kind() {
            "package_clause" => SymbolKind::Package,
            "function_declaration" => SymbolKind::Function,
            "method_declaration" => SymbolKind::Method,
            "type_spec" => match node.child_by_field_name("type").map(|t| t.kind()) {
                Some("struct_type") => SymbolKind::Struct,
                Some("interface_type") => SymbolKind::Interface,
                _ => SymbolKind::Type,
            },
            "const_spec" => SymbolKind::Constant,
            "field_declaration" => SymbolKind::Field,
            _ => SymbolKind::Variable,
        }
    }

    fn extract_signature(&self, node: Node, source: &[u8]) -> Option<String> {
        match node.kind() {
            "type_spec" => {
                let name = self.extract_name(node, source)?;
                let kind = node
                    .child_by_field_name("type")
                    .map(|t| match t.kind() {
                        "struct_type" => "struct".to_string(),
                        "interface_type" => "interface".to_string(),
                        _ => node_text(t, source).map(collapse_whitespace).unwrap_or_default(),
                    })
                    .unwrap_or_default();
                Some(format!("type {} {}", name, kind).trim_end().to_string())
            }
            _ => header_signature(node, source),
        }
    }

    fn extract_docstring(&self, node: Node, source: &[u8]) -> Option<String> {
        let anchor = match node.kind() {
            "type_spec" | "const_spec" | "var_spec" => node.parent()?,
            _ => node,
        };
        preceding_comments(anchor, source, &["comment"], |text| text.starts_with("//"))
    }

    fn extract_import(&self, node: Node, source: &[u8]) -> Option<String> {
        node.child_by_field_name("path")
            .and_then(|p| node_text(p, source))
            .map(strip_quotes)
    }

    fn explicit_parent(&self, node: Node, source: &[u8]) -> Option<String> {
        if node.kind() != "method_declaration" {
            return None;
        }
        let receiver = node.child_by_field_name("receiver")?;
        let mut cursor = receiver.walk();
        let param = receiver
            .named_children(&mut cursor)
            .find(|c| c.kind() == "parameter_declaration")?;
        let ty = node_text(param.child_by_field_name("type")?, source)?;
        let ty = ty.trim_start_matches('*');
        Some(ty.split('[').next().unwrap_or(ty).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_extractor() {
        assert!(get_extractor(Language::Rust).is_some());
        assert!(get_extractor(Language::Python).is_some());
        assert!(get_extractor(Language::JavaScript).is_some());
        assert!(get_extractor(Language::TypeScript).is_some());
        assert!(get_extractor(Language::Go).is_some());
        assert!(get_extractor(Language::Markdown).is_none());
    }

    #[test]
    fn test_collapse_whitespace_truncates() {
        assert_eq!(collapse_whitespace("fn  a(\n  x: u32,\n)"), "fn a( x: u32, )");
        let long = "x ".repeat(400);
        assert_eq!(collapse_whitespace(&long).chars().count(), MAX_SIGNATURE_CHARS);
    }
}
