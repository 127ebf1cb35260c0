use std::io::Read;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use explain_core::{EntryKind, ExplainError, TreeEntry};

/// A repository tree the extractor can walk.
///
/// Paths are `/`-separated and relative to the repository root; the root
/// itself is the empty string.
#[async_trait]
pub trait TreeSource: Send + Sync {
    /// List the direct children of `dir`.
    async fn list_dir(&self, dir: &str) -> explain_core::Result<Vec<TreeEntry>>;

    /// Read at most `max_bytes` bytes of the file at `path`.
    async fn read_file(&self, path: &str, max_bytes: usize) -> explain_core::Result<Vec<u8>>;
}

/// A [`TreeSource`] backed by a local directory.
///
/// # Examples
///
/// ```no_run
/// use explain_signal::LocalTree;
///
/// let tree = LocalTree::new(".").unwrap();
/// assert!(tree.root().is_absolute());
/// ```
#[derive(Debug, Clone)]
pub struct LocalTree {
    root: PathBuf,
}

impl LocalTree {
    /// Open `root` as a tree source.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::FileNotFound`] if `root` is not a directory.
    pub fn new(root: impl AsRef<Path>) -> explain_core::Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(ExplainError::FileNotFound(root.to_path_buf()));
        }
        let root = root.canonicalize()?;
        Ok(Self { root })
    }

    /// Absolute path of the tree root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory name of the root, used as the display name of local runs.
    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string())
    }

    fn absolute(&self, rel: &str) -> PathBuf {
        if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        }
    }
}

#[async_trait]
impl TreeSource for LocalTree {
    async fn list_dir(&self, dir: &str) -> explain_core::Result<Vec<TreeEntry>> {
        let abs = self.absolute(dir);
        let mut entries = Vec::new();

        for entry in std::fs::read_dir(&abs)? {
            let Ok(entry) = entry else {
                continue;
            };
            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            // Symlinked files count as files; symlinked directories are not followed.
            let kind = if file_type.is_dir() {
                EntryKind::Dir
            } else if file_type.is_file() {
                EntryKind::File
            } else if file_type.is_symlink()
                && std::fs::metadata(entry.path()).map(|m| m.is_file()).unwrap_or(false)
            {
                EntryKind::File
            } else {
                EntryKind::Other
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            let path = if dir.is_empty() {
                name.clone()
            } else {
                format!("{dir}/{name}")
            };
            entries.push(TreeEntry { name, kind, path });
        }

        Ok(entries)
    }

    async fn read_file(&self, path: &str, max_bytes: usize) -> explain_core::Result<Vec<u8>> {
        let file = std::fs::File::open(self.absolute(path))?;
        let mut buf = Vec::new();
        file.take(max_bytes as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn lists_with_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/bin")).unwrap();
        fs::write(dir.path().join("src/lib.rs"), "").unwrap();

        let tree = LocalTree::new(dir.path()).unwrap();
        let mut entries = tree.list_dir("src").await.unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "src/bin");
        assert_eq!(entries[0].kind, EntryKind::Dir);
        assert_eq!(entries[1].path, "src/lib.rs");
        assert_eq!(entries[1].kind, EntryKind::File);
    }

    #[tokio::test]
    async fn read_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("big.txt"), "x".repeat(100)).unwrap();

        let tree = LocalTree::new(dir.path()).unwrap();
        let bytes = tree.read_file("big.txt", 10).await.unwrap();
        assert_eq!(bytes.len(), 10);
    }

    #[test]
    fn missing_root_is_file_not_found() {
        let err = LocalTree::new("/definitely/not/here").unwrap_err();
        assert!(matches!(err, ExplainError::FileNotFound(_)));
    }
}
