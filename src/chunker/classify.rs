use super::boundary::{is_comment_line, is_leading_decoration, strip_modifiers};
use super::ChunkType;
use crate::file::{Language, LanguageFamily};
use std::path::Path;

/// Best-effort lexical classification of a chunk
pub fn classify(language: Language, file_path: &str, content: &str) -> ChunkType {
    if language == Language::Markdown || language.family() != LanguageFamily::Code {
        return ChunkType::Documentation;
    }

    if is_test_path(file_path) || has_test_marker(content) {
        return ChunkType::Test;
    }

    let mut significant = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .peekable();

    if significant.peek().is_none() {
        return ChunkType::Code;
    }
    if content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .all(|l| is_comment_line(language, l) || l.starts_with("*/"))
    {
        return ChunkType::Comment;
    }

    let head = significant
        .find(|l| !is_leading_decoration(language, l))
        .unwrap_or_default();
    let decl = strip_modifiers(head);

    if is_class_like(language, decl) {
        ChunkType::Class
    } else if is_function_like(language, decl) {
        ChunkType::Function
    } else {
        ChunkType::Code
    }
}

fn is_test_path(file_path: &str) -> bool {
    let path = Path::new(file_path);
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_lowercase();
    name.contains("_test.")
        || name.starts_with("test_")
        || name.contains(".test.")
        || name.contains(".spec.")
        || path.components().any(|c| {
            matches!(c.as_os_str().to_str(), Some("tests") | Some("__tests__"))
        })
}

fn has_test_marker(content: &str) -> bool {
    content.lines().map(str::trim_start).any(|l| {
        l.starts_with("#[test]")
            || l.starts_with("#[tokio::test")
            || l.starts_with("func Test")
            || l.starts_with("def test_")
            || l.starts_with("@Test")
            || l.starts_with("describe(")
            || l.starts_with("it(")
            || l.starts_with("test(")
    })
}

fn is_class_like(language: Language, decl: &str) -> bool {
    match language {
        Language::Go => {
            decl.starts_with("type ") && (decl.contains(" struct") || decl.contains(" interface"))
        }
        Language::Rust => ["struct ", "enum ", "trait ", "impl ", "impl<", "union "]
            .iter()
            .any(|kw| decl.starts_with(kw)),
        Language::Ruby => decl.starts_with("class ") || decl.starts_with("module "),
        _ => ["class ", "interface ", "struct ", "enum ", "record ", "object ", "trait "]
            .iter()
            .any(|kw| decl.starts_with(kw)),
    }
}

fn is_function_like(language: Language, decl: &str) -> bool {
    match language {
        Language::Go => decl.starts_with("func "),
        Language::Rust => decl.starts_with("fn "),
        Language::Python | Language::Ruby => decl.starts_with("def "),
        Language::JavaScript | Language::TypeScript | Language::Php => {
            decl.starts_with("function") || decl.contains("=>")
        }
        Language::Kotlin => decl.starts_with("fun "),
        Language::Swift => decl.starts_with("func "),
        Language::Shell => decl.starts_with("function ") || decl.contains("() {"),
        Language::C | Language::Cpp | Language::Java | Language::CSharp => {
            decl.contains('(') && !decl.ends_with(';') && !decl.starts_with("if")
                && !decl.starts_with("for") && !decl.starts_with("while")
                && !decl.starts_with("return")
        }
        _ => false,
    }
}
