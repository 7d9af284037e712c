//! Local directory backend.
//!
//! Each workspace is a directory under a root: `<root>/<workspace>/...`.
//! Workspace metadata and dotfiles are never listed, read or written.

use super::{FileEntry, FileStore, normalize_path};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Files the workspace server keeps to itself.
const HIDDEN_FILES: &[&str] = &["workspace.json", ".vault_pass"];

/// File store over a local directory tree.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Get the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn workspace_dir(&self, workspace: &str) -> Result<PathBuf> {
        if workspace.is_empty()
            || workspace.starts_with('.')
            || workspace.contains(['/', '\\'])
        {
            return Err(Error::InvalidPath {
                path: workspace.to_string(),
                reason: "invalid workspace id",
            });
        }
        Ok(self.root.join(workspace))
    }

    fn resolve(&self, workspace: &str, path: &str) -> Result<PathBuf> {
        let relative = normalize_path(path)?;
        if relative.split('/').any(is_hidden) {
            return Err(Error::InvalidPath {
                path: path.to_string(),
                reason: "access denied",
            });
        }
        Ok(self.workspace_dir(workspace)?.join(relative))
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.') || HIDDEN_FILES.contains(&name)
}

impl FileStore for LocalStore {
    fn read_file(&self, workspace: &str, path: &str) -> Result<Option<String>> {
        let target = self.resolve(workspace, path)?;
        if !target.is_file() {
            return Ok(None);
        }
        match fs::read(&target) {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(target, e)),
        }
    }

    fn write_file(&self, workspace: &str, path: &str, content: &str) -> Result<()> {
        let target = self.resolve(workspace, path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        // Write next to the target, then move into place
        let tmp = target.with_extension("hostsync-tmp");
        fs::write(&tmp, content).map_err(|e| Error::io(&tmp, e))?;
        fs::rename(&tmp, &target).map_err(|e| Error::io(&target, e))?;
        Ok(())
    }

    fn delete_file(&self, workspace: &str, path: &str) -> Result<()> {
        let target = self.resolve(workspace, path)?;
        let result = if target.is_dir() {
            fs::remove_dir_all(&target)
        } else {
            fs::remove_file(&target)
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(target, e)),
        }
    }

    fn rename_file(&self, workspace: &str, from: &str, to: &str) -> Result<()> {
        let source = self.resolve(workspace, from)?;
        let target = self.resolve(workspace, to)?;
        if !source.exists() {
            return Err(Error::NotFound {
                path: from.to_string(),
            });
        }
        if target.exists() {
            return Err(Error::Conflict {
                path: to.to_string(),
            });
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::rename(&source, &target).map_err(|e| Error::io(&source, e))
    }

    fn list_files(&self, workspace: &str) -> Result<Vec<FileEntry>> {
        let dir = self.workspace_dir(workspace)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        let walker = WalkDir::new(&dir)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| !is_hidden(&e.file_name().to_string_lossy()));

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.clone());
                Error::io(path, e.into())
            })?;
            let Ok(relative) = entry.path().strip_prefix(&dir) else {
                continue;
            };
            let path = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let is_dir = entry.file_type().is_dir();
            let metadata = entry.metadata().ok();
            entries.push(FileEntry {
                path,
                is_dir,
                size: match (&metadata, is_dir) {
                    (Some(m), false) => m.len(),
                    _ => 0,
                },
                modified_at: metadata
                    .and_then(|m| m.modified().ok())
                    .map(DateTime::<Utc>::from),
            });
        }

        entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.path.cmp(&b.path)));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, LocalStore) {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_write_read_delete() {
        let (_dir, store) = store();
        assert_eq!(store.read_file("ws1", "inventory.yml").unwrap(), None);

        store.write_file("ws1", "host_vars/web.yml", "ansible_host: a\n").unwrap();
        assert_eq!(
            store.read_file("ws1", "host_vars/web.yml").unwrap().as_deref(),
            Some("ansible_host: a\n")
        );

        store.delete_file("ws1", "host_vars/web.yml").unwrap();
        store.delete_file("ws1", "host_vars/web.yml").unwrap();
        assert!(!store.exists("ws1", "host_vars/web.yml").unwrap());
    }

    #[test]
    fn test_rename_conflict_and_missing() {
        let (_dir, store) = store();
        store.write_file("ws1", "host_vars/web.yml", "a: 1\n").unwrap();
        store.write_file("ws1", "host_vars/edge.yml", "b: 2\n").unwrap();

        let err = store
            .rename_file("ws1", "host_vars/web.yml", "host_vars/edge.yml")
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));

        let err = store
            .rename_file("ws1", "host_vars/nope.yml", "host_vars/x.yml")
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));

        store
            .rename_file("ws1", "host_vars/web.yml", "secrets/ssh_keys/web")
            .unwrap();
        assert!(store.exists("ws1", "secrets/ssh_keys/web").unwrap());
    }

    #[test]
    fn test_listing_skips_hidden_and_sorts() {
        let (dir, store) = store();
        store.write_file("ws1", "inventory.yml", "").unwrap();
        store.write_file("ws1", "host_vars/web.yml", "x: 1\n").unwrap();
        fs::write(dir.path().join("ws1/workspace.json"), "{}").unwrap();
        fs::create_dir_all(dir.path().join("ws1/.git")).unwrap();
        fs::write(dir.path().join("ws1/.git/HEAD"), "ref").unwrap();

        let entries = store.list_files("ws1").unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["host_vars", "host_vars/web.yml", "inventory.yml"]);
        assert!(entries[1].modified_at.is_some());
        assert_eq!(entries[1].size, 5);
    }

    #[test]
    fn test_rejects_traversal_and_hidden() {
        let (_dir, store) = store();
        assert!(store.read_file("ws1", "../other/inventory.yml").is_err());
        assert!(store.write_file("ws1", ".vault_pass", "x").is_err());
        assert!(store.read_file("../ws", "inventory.yml").is_err());
    }

    #[test]
    fn test_missing_workspace_lists_empty() {
        let (_dir, store) = store();
        assert!(store.list_files("nothing").unwrap().is_empty());
    }
}
