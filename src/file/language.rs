use serde::{Deserialize, Serialize};
use std::path::Path;

/// Languages recognised by the chunker and parsers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Java,
    C,
    Cpp,
    CSharp,
    Ruby,
    Php,
    Swift,
    Kotlin,
    Shell,
    Markdown,
    Text,
    Make,
    Dockerfile,
    Json,
    Yaml,
    Toml,
    Sql,
    Html,
    Css,
    Unknown,
}

/// Coarse grouping used for chunking strategy and ranking preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageFamily {
    Code,
    Markup,
    Text,
}

impl Language {
    /// Detect language from file extension, or from well-known extensionless names
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => Self::from_extension(ext),
            None => path
                .file_name()
                .and_then(|n| n.to_str())
                .map(Self::from_file_name)
                .unwrap_or(Self::Unknown),
        }
    }

    /// Detect language from extension string
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "rs" => Self::Rust,
            "py" | "pyw" | "pyi" => Self::Python,
            "js" | "mjs" | "cjs" | "jsx" => Self::JavaScript,
            "ts" | "mts" | "cts" | "tsx" => Self::TypeScript,
            "go" => Self::Go,
            "java" => Self::Java,
            "c" | "h" => Self::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" => Self::Cpp,
            "cs" => Self::CSharp,
            "rb" | "rake" => Self::Ruby,
            "php" => Self::Php,
            "swift" => Self::Swift,
            "kt" | "kts" => Self::Kotlin,
            "sh" | "bash" | "zsh" => Self::Shell,
            "md" | "markdown" | "mdx" => Self::Markdown,
            "txt" | "rst" | "adoc" => Self::Text,
            "mk" | "mak" => Self::Make,
            "json" => Self::Json,
            "yaml" | "yml" => Self::Yaml,
            "toml" => Self::Toml,
            "sql" => Self::Sql,
            "html" | "htm" | "xml" => Self::Html,
            "css" | "scss" | "sass" | "less" => Self::Css,
            _ => Self::Unknown,
        }
    }

    /// Conventional files that carry no extension
    pub fn from_file_name(name: &str) -> Self {
        match name {
            "Makefile" | "makefile" | "GNUmakefile" => Self::Make,
            "Dockerfile" | "Containerfile" => Self::Dockerfile,
            "README" | "LICENSE" | "LICENCE" | "COPYING" | "CHANGELOG" | "AUTHORS"
            | "CONTRIBUTING" | "NOTICE" | "TODO" => Self::Text,
            "Rakefile" | "Gemfile" => Self::Ruby,
            "Jenkinsfile" => Self::Java,
            _ => Self::Unknown,
        }
    }

    /// Check if a tree-sitter grammar is compiled in for this language
    pub fn supports_tree_sitter(&self) -> bool {
        matches!(
            self,
            Self::Rust | Self::Python | Self::JavaScript | Self::TypeScript | Self::Go
        )
    }

    /// Check if this is a text-based language (should be indexed)
    pub fn is_indexable(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    pub fn family(&self) -> LanguageFamily {
        match self {
            Self::Markdown | Self::Html | Self::Json | Self::Yaml | Self::Toml => {
                LanguageFamily::Markup
            }
            Self::Text | Self::Unknown => LanguageFamily::Text,
            _ => LanguageFamily::Code,
        }
    }

    /// Stable lowercase identifier, used in stores and filters
    pub fn id(&self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Go => "go",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Ruby => "ruby",
            Self::Php => "php",
            Self::Swift => "swift",
            Self::Kotlin => "kotlin",
            Self::Shell => "shell",
            Self::Markdown => "markdown",
            Self::Text => "text",
            Self::Make => "make",
            Self::Dockerfile => "dockerfile",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toml => "toml",
            Self::Sql => "sql",
            Self::Html => "html",
            Self::Css => "css",
            Self::Unknown => "unknown",
        }
    }

    /// Parse an identifier produced by [`Language::id`], or a common alias
    pub fn from_id(id: &str) -> Self {
        match id.to_lowercase().as_str() {
            "rust" => Self::Rust,
            "python" => Self::Python,
            "javascript" => Self::JavaScript,
            "typescript" => Self::TypeScript,
            "go" | "golang" => Self::Go,
            "java" => Self::Java,
            "c" => Self::C,
            "cpp" | "c++" => Self::Cpp,
            "csharp" | "c#" => Self::CSharp,
            "ruby" => Self::Ruby,
            "php" => Self::Php,
            "swift" => Self::Swift,
            "kotlin" => Self::Kotlin,
            "shell" => Self::Shell,
            "markdown" => Self::Markdown,
            "text" => Self::Text,
            "make" => Self::Make,
            "dockerfile" => Self::Dockerfile,
            "json" => Self::Json,
            "yaml" => Self::Yaml,
            "toml" => Self::Toml,
            "sql" => Self::Sql,
            "html" => Self::Html,
            "css" => Self::Css,
            other => Self::from_extension(other),
        }
    }

    /// Get the language name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rust => "Rust",
            Self::Python => "Python",
            Self::JavaScript => "JavaScript",
            Self::TypeScript => "TypeScript",
            Self::Go => "Go",
            Self::Java => "Java",
            Self::C => "C",
            Self::Cpp => "C++",
            Self::CSharp => "C#",
            Self::Ruby => "Ruby",
            Self::Php => "PHP",
            Self::Swift => "Swift",
            Self::Kotlin => "Kotlin",
            Self::Shell => "Shell",
            Self::Markdown => "Markdown",
            Self::Text => "Text",
            Self::Make => "Make",
            Self::Dockerfile => "Dockerfile",
            Self::Json => "JSON",
            Self::Yaml => "YAML",
            Self::Toml => "TOML",
            Self::Sql => "SQL",
            Self::Html => "HTML",
            Self::Css => "CSS",
            Self::Unknown => "Unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_go_detection() {
        assert_eq!(Language::from_extension("go"), Language::Go);
        assert_eq!(Language::from_path(&PathBuf::from("cmd/main.go")), Language::Go);
        assert!(Language::Go.supports_tree_sitter());
    }

    #[test]
    fn test_convention_files() {
        assert_eq!(Language::from_path(Path::new("README")), Language::Text);
        assert_eq!(Language::from_path(Path::new("LICENSE")), Language::Text);
        assert_eq!(Language::from_path(Path::new("Makefile")), Language::Make);
        assert_eq!(Language::from_path(Path::new("Dockerfile")), Language::Dockerfile);
        assert_eq!(Language::from_path(Path::new("random")), Language::Unknown);
    }

    #[test]
    fn test_text_is_not_markdown() {
        assert_eq!(Language::from_extension("txt"), Language::Text);
        assert_eq!(Language::from_extension("md"), Language::Markdown);
    }

    #[test]
    fn test_id_round_trips_through_from_id() {
        for lang in [Language::Rust, Language::Go, Language::Markdown, Language::Cpp] {
            assert_eq!(Language::from_id(lang.id()), lang);
        }
        assert_eq!(Language::from_id("golang"), Language::Go);
        assert_eq!(Language::from_id("rs"), Language::Rust);
    }

    #[test]
    fn test_family() {
        assert_eq!(Language::Go.family(), LanguageFamily::Code);
        assert_eq!(Language::Markdown.family(), LanguageFamily::Markup);
        assert_eq!(Language::Text.family(), LanguageFamily::Text);
    }
}
