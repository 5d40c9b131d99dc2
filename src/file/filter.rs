use super::Language;
use std::fs::{File, Metadata};
use std::io::Read;
use std::path::Path;

/// Decides which paths the walker descends into and which files get indexed
pub trait FileFilter: Send + Sync {
    /// True when a regular file should be handed to the indexes
    fn should_index(&self, path: &Path, metadata: &Metadata) -> bool;

    /// True when a path (file or directory) should be skipped entirely
    fn should_ignore(&self, path: &Path) -> bool;

    /// True when `path` or any directory between `root` and `path` is ignored
    fn is_ignored_within(&self, root: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let mut current = root.to_path_buf();
        for component in relative.components() {
            current.push(component);
            if self.should_ignore(&current) {
                return true;
            }
        }
        false
    }
}

/// Directories that never contain first-party sources
const EXCLUDED_DIRS: &[&str] = &[
    // Version control
    ".git", ".svn", ".hg", ".jj",
    // Build artifacts
    "node_modules", "target", "dist", "build", "out", "bin", "obj",
    // Python
    "__pycache__", ".pytest_cache", ".mypy_cache", ".tox", "venv", ".venv",
    // Ruby / PHP / Go
    "vendor", ".bundle",
    // Java
    ".gradle", ".m2",
    // IDE
    ".idea", ".vscode", ".vs",
    // Other
    "coverage", ".nyc_output", ".cache", ".next",
];

/// Extensions of compiled, archived or media files
const BINARY_EXTENSIONS: &[&str] = &[
    "exe", "dll", "so", "dylib", "a", "o", "lib", "bin", "wasm", "pyc", "class", "jar", "war",
    "zip", "tar", "gz", "bz2", "xz", "7z", "rar", "tgz",
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "svg", "webp", "tiff",
    "mp4", "avi", "mov", "wmv", "flv", "mkv", "webm",
    "mp3", "wav", "ogg", "flac", "aac", "wma",
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
    "ttf", "otf", "woff", "woff2", "db", "sqlite", "lock",
];

/// Default filter: excluded directories, binary sniffing and a size ceiling
#[derive(Debug, Clone)]
pub struct DefaultFileFilter {
    max_file_size: u64,
    extra_excluded: Vec<String>,
}

impl DefaultFileFilter {
    pub fn new(max_file_size: u64) -> Self {
        Self {
            max_file_size,
            extra_excluded: Vec::new(),
        }
    }

    /// Exclude additional directory names
    pub fn with_excluded_dirs<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_excluded.extend(dirs.into_iter().map(Into::into));
        self
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    fn is_excluded_name(&self, name: &str) -> bool {
        EXCLUDED_DIRS.contains(&name) || self.extra_excluded.iter().any(|d| d == name)
    }
}

impl Default for DefaultFileFilter {
    fn default() -> Self {
        Self::new(1024 * 1024)
    }
}

impl FileFilter for DefaultFileFilter {
    fn should_index(&self, path: &Path, metadata: &Metadata) -> bool {
        if !metadata.is_file() || metadata.len() > self.max_file_size {
            return false;
        }
        if self.should_ignore(path) || has_binary_extension(path) {
            return false;
        }
        if is_minified(path) {
            return false;
        }
        Language::from_path(path).is_indexable() && !looks_binary(path)
    }

    fn should_ignore(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|name| self.is_excluded_name(name))
            .unwrap_or(false)
    }
}

fn has_binary_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| BINARY_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_minified(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| name.ends_with(".min.js") || name.ends_with(".bundle.js") || name.ends_with(".min.css"))
        .unwrap_or(false)
}

/// Sniff the first 8KB: NUL bytes or a high share of control bytes mean binary
pub fn looks_binary(path: &Path) -> bool {
    let mut buffer = [0u8; 8192];
    let read = match File::open(path).and_then(|mut f| f.read(&mut buffer)) {
        Ok(n) => n,
        Err(_) => return false,
    };
    is_binary_content(&buffer[..read])
}

fn is_binary_content(data: &[u8]) -> bool {
    if data.is_empty() {
        return false;
    }
    if data.contains(&0) {
        return true;
    }

    let suspicious = data
        .iter()
        .filter(|&&b| !matches!(b, 0x09 | 0x0A | 0x0D | 0x20..=0x7E))
        .count();
    let ratio = suspicious as f64 / data.len() as f64;

    // Non-ASCII text is fine as long as it decodes; the buffer may cut a
    // multi-byte sequence, so only the valid prefix is required.
    match std::str::from_utf8(data) {
        Ok(_) => ratio > 0.80,
        Err(e) if e.error_len().is_none() => ratio > 0.80,
        Err(_) => ratio > 0.30,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn index(filter: &DefaultFileFilter, path: &Path) -> bool {
        let metadata = fs::metadata(path).unwrap();
        filter.should_index(path, &metadata)
    }

    #[test]
    fn test_accepts_code_and_convention_files() {
        let dir = TempDir::new().unwrap();
        let filter = DefaultFileFilter::default();
        for name in ["main.go", "lib.rs", "README", "LICENSE", "Makefile", "notes.txt"] {
            let path = dir.path().join(name);
            fs::write(&path, "hello\n").unwrap();
            assert!(index(&filter, &path), "{} should be indexed", name);
        }
    }

    #[test]
    fn test_rejects_binary_extension_and_content() {
        let dir = TempDir::new().unwrap();
        let filter = DefaultFileFilter::default();

        let png = dir.path().join("logo.png");
        fs::write(&png, "not really a png").unwrap();
        assert!(!index(&filter, &png));

        let sneaky = dir.path().join("data.txt");
        fs::write(&sneaky, [0x00u8, 0x01, 0x02, 0xFF]).unwrap();
        assert!(!index(&filter, &sneaky));
    }

    #[test]
    fn test_size_ceiling() {
        let dir = TempDir::new().unwrap();
        let filter = DefaultFileFilter::new(16);
        let path = dir.path().join("big.rs");
        fs::write(&path, "fn main() { println!(\"too big\"); }").unwrap();
        assert!(!index(&filter, &path));
    }

    #[test]
    fn test_ignores_excluded_directories() {
        let filter = DefaultFileFilter::default().with_excluded_dirs(["generated"]);
        let root = Path::new("/home/dev/build/repo");
        assert!(filter.should_ignore(Path::new("/repo/.git")));
        assert!(filter.is_ignored_within(root, &root.join("node_modules/x/index.js")));
        assert!(filter.is_ignored_within(root, &root.join("generated/api.rs")));
        // "build" above the root does not count
        assert!(!filter.is_ignored_within(root, &root.join("src/main.rs")));
    }

    #[test]
    fn test_utf8_text_is_not_binary() {
        assert!(!is_binary_content("Hello, 世界!".as_bytes()));
        assert!(is_binary_content(&[0xFF, 0xFE, 0xFD]));
        let control: Vec<u8> = (0x01..=0x08).cycle().take(1000).collect();
        assert!(is_binary_content(&control));
    }
}
