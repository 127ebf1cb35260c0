use explain_core::{EntryKind, ExplainError, TreeEntry};
use serde::Serialize;
use tracing::{debug, warn};

use crate::source::TreeSource;

/// Maximum number of key files read per extraction.
pub const MAX_KEY_FILES: usize = 12;

/// Maximum bytes kept per key file.
pub const MAX_FILE_BYTES: usize = 32_000;

/// Directory names pruned from every walk.
pub const SKIP_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    "env",
    ".env",
    "dist",
    "build",
    ".idea",
    ".vscode",
    ".mypy_cache",
    ".pytest_cache",
    "coverage",
    ".coverage",
    "htmlcov",
];

/// Lowercased basenames whose content is worth sending to the model.
pub const KEY_FILENAMES: &[&str] = &[
    "readme.md",
    "readme.txt",
    "readme.rst",
    "readme",
    "package.json",
    "pyproject.toml",
    "setup.py",
    "setup.cfg",
    "requirements.txt",
    "cargo.toml",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "composer.json",
    "gemfile",
    "makefile",
    "dockerfile",
    "docker-compose.yml",
    "docker-compose.yaml",
    ".env.example",
    "tsconfig.json",
    "angular.json",
    "next.config.js",
    "vite.config.js",
    "vite.config.ts",
    "webpack.config.js",
];

/// Budgets for one extraction.
///
/// # Examples
///
/// ```
/// use explain_signal::SignalLimits;
///
/// let limits = SignalLimits::default();
/// assert_eq!(limits.max_key_files, 12);
/// assert_eq!(limits.max_file_bytes, 32_000);
/// assert!(limits.max_depth.is_none());
///
/// let remote = SignalLimits::with_max_depth(3);
/// assert_eq!(remote.max_depth, Some(3));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalLimits {
    /// Cap on key files read.
    pub max_key_files: usize,
    /// Cap on bytes kept per key file.
    pub max_file_bytes: usize,
    /// Deepest directory level descended into; the root is level 0.
    pub max_depth: Option<usize>,
}

impl SignalLimits {
    /// Default limits with a bounded walk depth.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            max_depth: Some(max_depth),
            ..Self::default()
        }
    }
}

impl Default for SignalLimits {
    fn default() -> Self {
        Self {
            max_key_files: MAX_KEY_FILES,
            max_file_bytes: MAX_FILE_BYTES,
            max_depth: None,
        }
    }
}

/// One key file and its (possibly truncated) content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyFile {
    /// Path relative to the repository root.
    pub path: String,
    /// UTF-8 content, at most the configured byte limit.
    pub content: String,
}

impl KeyFile {
    /// Lowercased basename.
    pub fn basename(&self) -> String {
        self.path
            .rsplit('/')
            .next()
            .unwrap_or(&self.path)
            .to_lowercase()
    }
}

/// The bounded signal data pulled from one repository.
///
/// Built once by [`extract`]; read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SignalSet {
    /// Every file path seen, in discovery order.
    pub tree: Vec<String>,
    /// Key files in discovery order.
    pub key_files: Vec<KeyFile>,
    /// `tree` joined by newlines.
    pub tree_text: String,
    /// Key files rendered as `### path` blocks.
    pub files_text: String,
}

impl SignalSet {
    fn from_parts(tree: Vec<String>, key_files: Vec<KeyFile>) -> Self {
        let tree_text = tree.join("\n");
        let files_text = key_files
            .iter()
            .map(|f| format!("### {}\n{}", f.path, f.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        Self {
            tree,
            key_files,
            tree_text,
            files_text,
        }
    }

    /// The first key file whose basename starts with `readme`.
    pub fn readme(&self) -> Option<&KeyFile> {
        self.key_files
            .iter()
            .find(|f| f.basename().starts_with("readme"))
    }

    /// Look up a key file by exact path.
    pub fn key_file(&self, path: &str) -> Option<&KeyFile> {
        self.key_files.iter().find(|f| f.path == path)
    }

    /// `true` when the walk found no files at all.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

/// Whether `name` (any case) is a key file name.
///
/// # Examples
///
/// ```
/// use explain_signal::extract::is_key_file;
///
/// assert!(is_key_file("README.md"));
/// assert!(is_key_file("Cargo.toml"));
/// assert!(!is_key_file("main.rs"));
/// ```
pub fn is_key_file(name: &str) -> bool {
    let lower = name.to_lowercase();
    KEY_FILENAMES.contains(&lower.as_str())
}

/// Whether a directory named `name` is pruned.
pub fn is_skipped_dir(name: &str) -> bool {
    SKIP_DIRS.contains(&name)
}

/// Cut `s` to at most `max_bytes` bytes without splitting a character.
///
/// # Examples
///
/// ```
/// use explain_signal::extract::truncate_to_char_boundary;
///
/// assert_eq!(truncate_to_char_boundary("héllo", 2), "h");
/// assert_eq!(truncate_to_char_boundary("abc", 10), "abc");
/// ```
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Extract signals with the default limits.
///
/// # Errors
///
/// Returns [`ExplainError::Signal`] if the root directory cannot be listed.
pub async fn extract(source: &dyn TreeSource) -> explain_core::Result<SignalSet> {
    extract_with(source, &SignalLimits::default()).await
}

/// Walk `source` once and collect the tree and key files.
///
/// Each directory emits its files (sorted by name) before descending into
/// its subdirectories (sorted by name), so output is stable across runs.
/// Unreadable files and unlistable subdirectories are skipped.
///
/// # Errors
///
/// Returns [`ExplainError::Signal`] if the root directory cannot be listed.
pub async fn extract_with(
    source: &dyn TreeSource,
    limits: &SignalLimits,
) -> explain_core::Result<SignalSet> {
    let mut tree = Vec::new();
    let mut key_files = Vec::new();

    // Explicit stack; subdirectories are pushed in reverse to keep pre-order.
    let mut stack: Vec<(String, usize)> = vec![(String::new(), 0)];

    while let Some((dir, depth)) = stack.pop() {
        let entries = match source.list_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if dir.is_empty() => {
                return Err(ExplainError::Signal(format!(
                    "cannot list repository root: {e}"
                )));
            }
            Err(e) => {
                warn!(dir = %dir, error = %e, "skipping unlistable directory");
                continue;
            }
        };

        let (mut files, mut dirs): (Vec<TreeEntry>, Vec<TreeEntry>) = entries
            .into_iter()
            .filter(|e| match e.kind {
                EntryKind::File => true,
                EntryKind::Dir => !is_skipped_dir(&e.name),
                EntryKind::Other => false,
            })
            .partition(|e| e.kind == EntryKind::File);
        files.sort_by(|a, b| a.name.cmp(&b.name));
        dirs.sort_by(|a, b| a.name.cmp(&b.name));

        for file in files {
            if key_files.len() < limits.max_key_files && is_key_file(&file.name) {
                match source.read_file(&file.path, limits.max_file_bytes).await {
                    Ok(bytes) => {
                        let text = String::from_utf8_lossy(&bytes);
                        let content =
                            truncate_to_char_boundary(&text, limits.max_file_bytes).to_string();
                        key_files.push(KeyFile {
                            path: file.path.clone(),
                            content,
                        });
                    }
                    Err(e) => debug!(path = %file.path, error = %e, "key file unreadable"),
                }
            }
            tree.push(file.path);
        }

        let next_depth = depth + 1;
        if limits.max_depth.is_some_and(|max| next_depth > max) {
            continue;
        }
        for sub in dirs.into_iter().rev() {
            stack.push((sub.path, next_depth));
        }
    }

    debug!(
        files = tree.len(),
        key_files = key_files.len(),
        "signal extraction complete"
    );
    Ok(SignalSet::from_parts(tree, key_files))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::LocalTree;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::fs;

    /// In-memory tree where listed-but-absent directories fail to list.
    struct FakeTree {
        dirs: HashMap<String, Vec<TreeEntry>>,
        files: HashMap<String, String>,
    }

    impl FakeTree {
        fn new() -> Self {
            Self {
                dirs: HashMap::new(),
                files: HashMap::new(),
            }
        }

        fn entry(path: &str, kind: EntryKind) -> TreeEntry {
            TreeEntry {
                name: path.rsplit('/').next().unwrap().to_string(),
                kind,
                path: path.to_string(),
            }
        }

        fn dir(mut self, dir: &str, entries: &[(&str, EntryKind)]) -> Self {
            let list = entries
                .iter()
                .map(|(p, k)| Self::entry(p, *k))
                .collect();
            self.dirs.insert(dir.to_string(), list);
            self
        }

        fn file(mut self, path: &str, content: &str) -> Self {
            self.files.insert(path.to_string(), content.to_string());
            self
        }
    }

    #[async_trait]
    impl TreeSource for FakeTree {
        async fn list_dir(&self, dir: &str) -> explain_core::Result<Vec<TreeEntry>> {
            self.dirs
                .get(dir)
                .cloned()
                .ok_or_else(|| ExplainError::GitHub(format!("404 listing {dir}")))
        }

        async fn read_file(&self, path: &str, max_bytes: usize) -> explain_core::Result<Vec<u8>> {
            let content = self
                .files
                .get(path)
                .ok_or_else(|| ExplainError::GitHub(format!("404 reading {path}")))?;
            let bytes = content.as_bytes();
            Ok(bytes[..bytes.len().min(max_bytes)].to_vec())
        }
    }

    fn make_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("node_modules/left-pad")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("README.md"), "# Demo").unwrap();
        fs::write(root.join("Cargo.toml"), "[package]\nname = \"demo\"").unwrap();
        fs::write(root.join(".env.example"), "TOKEN=").unwrap();
        fs::write(root.join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(root.join("node_modules/left-pad/package.json"), "{}").unwrap();
        fs::write(root.join(".git/HEAD"), "ref: refs/heads/main").unwrap();
        dir
    }

    #[tokio::test]
    async fn files_come_before_subdirectories() {
        let dir = make_repo();
        let tree = LocalTree::new(dir.path()).unwrap();
        let signals = extract(&tree).await.unwrap();

        assert_eq!(
            signals.tree,
            vec![".env.example", "Cargo.toml", "README.md", "src/main.rs"]
        );
        assert_eq!(
            signals.tree_text,
            ".env.example\nCargo.toml\nREADME.md\nsrc/main.rs"
        );
    }

    #[tokio::test]
    async fn skipped_directories_are_never_listed() {
        let dir = make_repo();
        let tree = LocalTree::new(dir.path()).unwrap();
        let signals = extract(&tree).await.unwrap();

        assert!(signals.tree.iter().all(|p| !p.starts_with("node_modules")));
        assert!(signals.tree.iter().all(|p| !p.starts_with(".git/")));
        assert!(signals.key_file("node_modules/left-pad/package.json").is_none());
    }

    #[tokio::test]
    async fn files_text_renders_key_files_in_order() {
        let dir = make_repo();
        let tree = LocalTree::new(dir.path()).unwrap();
        let signals = extract(&tree).await.unwrap();

        assert_eq!(
            signals.files_text,
            "### .env.example\nTOKEN=\n\n### Cargo.toml\n[package]\nname = \"demo\"\n\n### README.md\n# Demo"
        );
        assert_eq!(signals.readme().unwrap().path, "README.md");
    }

    #[tokio::test]
    async fn extraction_is_deterministic() {
        let dir = make_repo();
        let tree = LocalTree::new(dir.path()).unwrap();
        let first = extract(&tree).await.unwrap();
        let second = extract(&tree).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn key_files_are_capped_at_twelve() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..13 {
            let sub = dir.path().join(format!("pkg{i:02}"));
            fs::create_dir_all(&sub).unwrap();
            fs::write(sub.join("package.json"), format!("{{\"n\":{i}}}")).unwrap();
        }

        let tree = LocalTree::new(dir.path()).unwrap();
        let signals = extract(&tree).await.unwrap();

        assert_eq!(signals.key_files.len(), MAX_KEY_FILES);
        assert_eq!(signals.tree.len(), 13);
        assert_eq!(signals.tree[12], "pkg12/package.json");
        assert!(signals.key_file("pkg12/package.json").is_none());
        assert!(signals.key_file("pkg11/package.json").is_some());
    }

    #[tokio::test]
    async fn content_is_capped_on_a_char_boundary() {
        let dir = tempfile::tempdir().unwrap();
        // '€' is three bytes, so the byte limit lands mid-character.
        fs::write(dir.path().join("README.md"), "€".repeat(20_000)).unwrap();

        let tree = LocalTree::new(dir.path()).unwrap();
        let signals = extract(&tree).await.unwrap();

        let content = &signals.key_files[0].content;
        assert!(content.len() <= MAX_FILE_BYTES);
        assert!(content.chars().all(|c| c == '€'));
        assert_eq!(content.len(), (MAX_FILE_BYTES / 3) * 3);
    }

    #[tokio::test]
    async fn unlistable_subdirectory_is_skipped() {
        let fake = FakeTree::new()
            .dir(
                "",
                &[
                    ("broken", EntryKind::Dir),
                    ("ok", EntryKind::Dir),
                    ("README", EntryKind::File),
                ],
            )
            .dir("ok", &[("ok/go.mod", EntryKind::File)])
            .file("README", "hello")
            .file("ok/go.mod", "module demo");

        let signals = extract(&fake).await.unwrap();
        assert_eq!(signals.tree, vec!["README", "ok/go.mod"]);
        assert_eq!(signals.key_files.len(), 2);
    }

    #[tokio::test]
    async fn unreadable_key_file_is_omitted_but_listed() {
        let fake = FakeTree::new().dir(
            "",
            &[("Makefile", EntryKind::File), ("main.c", EntryKind::File)],
        );

        let signals = extract(&fake).await.unwrap();
        assert_eq!(signals.tree, vec!["Makefile", "main.c"]);
        assert!(signals.key_files.is_empty());
        assert!(signals.files_text.is_empty());
    }

    #[tokio::test]
    async fn unlistable_root_is_a_signal_error() {
        let fake = FakeTree::new();
        let err = extract(&fake).await.unwrap_err();
        assert!(matches!(err, ExplainError::Signal(_)));
    }

    #[tokio::test]
    async fn max_depth_bounds_the_walk() {
        let fake = FakeTree::new()
            .dir("", &[("a", EntryKind::Dir), ("top.txt", EntryKind::File)])
            .dir("a", &[("a/b", EntryKind::Dir), ("a/one.txt", EntryKind::File)])
            .dir("a/b", &[("a/b/two.txt", EntryKind::File)]);

        let signals = extract_with(&fake, &SignalLimits::with_max_depth(1))
            .await
            .unwrap();
        assert_eq!(signals.tree, vec!["top.txt", "a/one.txt"]);
    }

    #[tokio::test]
    async fn other_entries_are_ignored() {
        let fake = FakeTree::new().dir(
            "",
            &[("vendor-sub", EntryKind::Other), ("lib.rs", EntryKind::File)],
        );
        let signals = extract(&fake).await.unwrap();
        assert_eq!(signals.tree, vec!["lib.rs"]);
    }

    #[test]
    fn truncate_never_splits_characters() {
        assert_eq!(truncate_to_char_boundary("aé", 2), "a");
        assert_eq!(truncate_to_char_boundary("", 0), "");
    }
}
