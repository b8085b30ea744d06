//! Content store abstraction and the filesystem-backed implementation.

use std::path::{Path, PathBuf};

use scripthost_core::{BoxFuture, ScriptError, ScriptResult, path};

/// Immediate children of a folder, as full vault-relative paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    /// Files directly inside the folder.
    pub files: Vec<String>,

    /// Subfolders directly inside the folder.
    pub folders: Vec<String>,
}

/// Storage holding scripts and documents, addressed by vault-relative path.
pub trait ContentStore: Send + Sync {
    /// Check whether a file or folder exists.
    fn exists<'a>(&'a self, path: &'a str) -> BoxFuture<'a, bool>;

    /// List the immediate children of a folder.
    fn list<'a>(&'a self, path: &'a str) -> BoxFuture<'a, ScriptResult<Listing>>;

    /// Read a file as UTF-8 text.
    fn read<'a>(&'a self, path: &'a str) -> BoxFuture<'a, ScriptResult<String>>;

    /// Filesystem location of a path, when the store is disk-backed.
    fn full_path(&self, path: &str) -> Option<PathBuf>;
}

/// Content store rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, vault_path: &str) -> PathBuf {
        let normalized = path::join([vault_path]);
        if normalized.is_empty() {
            self.root.clone()
        } else {
            self.root.join(normalized)
        }
    }
}

impl ContentStore for FsStore {
    fn exists<'a>(&'a self, path: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            tokio::fs::try_exists(self.resolve(path))
                .await
                .unwrap_or(false)
        })
    }

    fn list<'a>(&'a self, folder: &'a str) -> BoxFuture<'a, ScriptResult<Listing>> {
        Box::pin(async move {
            let dir = self.resolve(folder);
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| ScriptError::io(folder, e))?;

            let mut listing = Listing::default();
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| ScriptError::io(folder, e))?
            {
                let name = entry.file_name().to_string_lossy().to_string();
                let child = path::join([folder, name.as_str()]);
                let file_type = match entry.file_type().await {
                    Ok(file_type) => file_type,
                    Err(e) => {
                        tracing::debug!(target: "scripthost::store", path = %child, error = %e, "Skipping unreadable entry");
                        continue;
                    }
                };

                if file_type.is_dir() {
                    listing.folders.push(child);
                } else {
                    listing.files.push(child);
                }
            }

            Ok(listing)
        })
    }

    fn read<'a>(&'a self, path: &'a str) -> BoxFuture<'a, ScriptResult<String>> {
        Box::pin(async move {
            tokio::fs::read_to_string(self.resolve(path))
                .await
                .map_err(|e| ScriptError::io(path, e))
        })
    }

    fn full_path(&self, path: &str) -> Option<PathBuf> {
        Some(self.resolve(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_vault() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("Scripts/sub")).unwrap();
        fs::write(root.join("Scripts/a.rhai"), "fn invoke(app) {}").unwrap();
        fs::write(root.join("Scripts/sub/b.lua"), "return {}").unwrap();
        temp
    }

    #[tokio::test]
    async fn test_exists_and_read() {
        let temp = create_vault();
        let store = FsStore::new(temp.path());

        assert!(store.exists("Scripts").await);
        assert!(store.exists("Scripts/a.rhai").await);
        assert!(!store.exists("Scripts/missing.rhai").await);
        assert_eq!(store.read("Scripts/a.rhai").await.unwrap(), "fn invoke(app) {}");
    }

    #[tokio::test]
    async fn test_list_partitions_files_and_folders() {
        let temp = create_vault();
        let store = FsStore::new(temp.path());

        let listing = store.list("Scripts").await.unwrap();
        assert_eq!(listing.files, vec!["Scripts/a.rhai".to_string()]);
        assert_eq!(listing.folders, vec!["Scripts/sub".to_string()]);
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let temp = create_vault();
        let store = FsStore::new(temp.path());

        let err = store.read("nope.rhai").await.unwrap_err();
        assert!(matches!(err, ScriptError::NotFound { .. }));
    }
}
