//! Lexical heuristics for where a new block starts.

use crate::file::Language;

/// Modifiers stripped before matching a declaration keyword
const MODIFIERS: &[&str] = &[
    "pub(crate) ", "pub(super) ", "pub ", "export default ", "export ", "public ", "private ",
    "protected ", "internal ", "static ", "abstract ", "final ", "async ", "unsafe ", "const ",
    "override ", "open ", "extern ",
];

/// Strip leading visibility/async modifiers, repeatedly
pub fn strip_modifiers(line: &str) -> &str {
    let mut rest = line;
    'outer: loop {
        for m in MODIFIERS {
            if let Some(stripped) = rest.strip_prefix(m) {
                rest = stripped;
                continue 'outer;
            }
        }
        return rest;
    }
}

/// True when `line` opens a function, type or import block in `language`
pub fn is_block_start(language: Language, line: &str) -> bool {
    let trimmed = line.trim_start();
    if trimmed.is_empty() {
        return false;
    }

    match language {
        Language::Go => {
            trimmed.starts_with("func ") || trimmed.starts_with("type ") || trimmed.starts_with("import (")
        }
        Language::Rust => {
            let decl = strip_modifiers(trimmed);
            ["fn ", "impl ", "impl<", "struct ", "enum ", "trait ", "mod ", "macro_rules!"]
                .iter()
                .any(|kw| decl.starts_with(kw))
        }
        Language::Python => {
            let decl = trimmed.strip_prefix("async ").unwrap_or(trimmed);
            decl.starts_with("def ") || decl.starts_with("class ")
        }
        Language::JavaScript | Language::TypeScript => {
            let decl = strip_modifiers(trimmed);
            ["function ", "function*", "class ", "interface ", "type ", "enum ", "namespace "]
                .iter()
                .any(|kw| decl.starts_with(kw))
                || (trimmed.len() == line.len() && is_arrow_binding(decl))
        }
        Language::C | Language::Cpp => {
            trimmed.starts_with("#include")
                || trimmed.starts_with("#define")
                || trimmed.starts_with("namespace ")
                || trimmed.starts_with("template")
                || trimmed.starts_with("typedef ")
                || trimmed.starts_with("struct ")
                || trimmed.starts_with("class ")
                || (trimmed.len() == line.len() && looks_like_c_definition(trimmed))
        }
        Language::Java | Language::CSharp | Language::Kotlin | Language::Swift => {
            let decl = strip_modifiers(trimmed);
            ["class ", "interface ", "enum ", "record ", "struct ", "fun ", "func ", "void "]
                .iter()
                .any(|kw| decl.starts_with(kw))
                || (decl.len() < trimmed.len() && decl.contains('(') && !decl.contains(';'))
        }
        Language::Ruby => {
            trimmed.starts_with("def ") || trimmed.starts_with("class ") || trimmed.starts_with("module ")
        }
        Language::Php => {
            let decl = strip_modifiers(trimmed);
            decl.starts_with("function ") || decl.starts_with("class ") || decl.starts_with("interface ")
        }
        Language::Shell => {
            trimmed.starts_with("function ") || (trimmed.len() == line.len() && trimmed.contains("() {"))
        }
        Language::Sql => {
            let upper = trimmed.to_uppercase();
            ["CREATE ", "ALTER ", "INSERT ", "SELECT ", "WITH "]
                .iter()
                .any(|kw| upper.starts_with(kw))
        }
        Language::Make => !line.starts_with('\t') && trimmed.contains(':') && !trimmed.starts_with('#'),
        Language::Dockerfile => trimmed.to_uppercase().starts_with("FROM "),
        _ => false,
    }
}

fn is_arrow_binding(decl: &str) -> bool {
    (decl.starts_with("let ") || decl.starts_with("var ") || decl.starts_with("const "))
        && decl.contains("=>")
}

fn looks_like_c_definition(line: &str) -> bool {
    const CONTROL: &[&str] = &["if", "for", "while", "switch", "return", "else", "do", "case"];
    let first = line.split(|c: char| !c.is_alphanumeric() && c != '_').next().unwrap_or("");
    line.contains('(')
        && !line.ends_with(';')
        && !line.starts_with('{')
        && !line.starts_with('}')
        && !line.starts_with("//")
        && !CONTROL.contains(&first)
}

/// Line comment prefixes per language
pub fn comment_prefixes(language: Language) -> &'static [&'static str] {
    match language {
        Language::Python | Language::Ruby | Language::Shell | Language::Yaml | Language::Toml
        | Language::Make | Language::Dockerfile => &["#"],
        Language::Sql => &["--"],
        Language::Html | Language::Markdown => &["<!--"],
        Language::Php => &["//", "#", "/*", "*"],
        Language::Text | Language::Json | Language::Unknown => &[],
        _ => &["//", "/*", "*"],
    }
}

/// True for comment lines, attributes and decorators that belong to the next block
pub fn is_leading_decoration(language: Language, line: &str) -> bool {
    let trimmed = line.trim_start();
    if trimmed.is_empty() {
        return false;
    }
    if is_comment_line(language, trimmed) {
        return true;
    }
    match language {
        Language::Rust => trimmed.starts_with("#["),
        Language::Python | Language::Java | Language::TypeScript | Language::JavaScript
        | Language::Kotlin => trimmed.starts_with('@'),
        Language::CSharp => trimmed.starts_with('['),
        _ => false,
    }
}

pub fn is_comment_line(language: Language, trimmed: &str) -> bool {
    if matches!(language, Language::C | Language::Cpp) && trimmed.starts_with('#') {
        return false;
    }
    comment_prefixes(language).iter().any(|p| trimmed.starts_with(p))
}

/// Markdown ATX heading (`#` to `######` followed by a space or end of line)
pub fn is_markdown_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    (1..=6).contains(&hashes) && line[hashes..].chars().next().map_or(true, char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_go_block_starts() {
        assert!(is_block_start(Language::Go, "func main() {"));
        assert!(is_block_start(Language::Go, "type Server struct {"));
        assert!(!is_block_start(Language::Go, "\treturn nil"));
    }

    #[test]
    fn test_rust_block_starts_with_modifiers() {
        assert!(is_block_start(Language::Rust, "pub async fn run() {"));
        assert!(is_block_start(Language::Rust, "    pub(crate) fn helper() {}"));
        assert!(is_block_start(Language::Rust, "impl<T> Store for T {"));
        assert!(!is_block_start(Language::Rust, "let x = fn_ptr;"));
    }

    #[test]
    fn test_c_definitions() {
        assert!(is_block_start(Language::C, "#include <stdio.h>"));
        assert!(is_block_start(Language::C, "int main(int argc, char **argv) {"));
        assert!(!is_block_start(Language::C, "if (x) {"));
        assert!(!is_block_start(Language::C, "    printf(\"hi\");"));
    }

    #[test]
    fn test_decorations() {
        assert!(is_leading_decoration(Language::Go, "// Run starts the server."));
        assert!(is_leading_decoration(Language::Rust, "#[derive(Debug)]"));
        assert!(is_leading_decoration(Language::Python, "@staticmethod"));
        assert!(!is_leading_decoration(Language::C, "#include <x.h>"));
        assert!(!is_leading_decoration(Language::Go, "x := 1"));
    }

    #[test]
    fn test_markdown_heading() {
        assert!(is_markdown_heading("# Title"));
        assert!(is_markdown_heading("### Usage"));
        assert!(is_markdown_heading("#"));
        assert!(!is_markdown_heading("#hashtag"));
        assert!(!is_markdown_heading("####### too deep"));
    }
}
