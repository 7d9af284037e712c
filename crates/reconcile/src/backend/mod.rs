//! File store abstraction.
//!
//! The [`FileStore`] trait is the only I/O boundary of the engine. Every
//! call is scoped to a workspace id and a workspace-relative path, enabling:
//! - A remote workspace API over HTTP ([`http::HttpStore`])
//! - A workspace directory on local disk ([`local::LocalStore`])
//! - An in-memory store for tests and dry runs ([`memory::MemoryStore`])

pub mod http;
pub mod local;
pub mod memory;

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// One entry of a workspace file listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Workspace-relative path using `/` separators
    pub path: String,
    /// Whether the entry is a directory
    #[serde(default)]
    pub is_dir: bool,
    /// Size in bytes (0 for directories)
    #[serde(default)]
    pub size: u64,
    /// Last modification time, when the store knows it
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
}

impl FileEntry {
    /// A regular file entry.
    pub fn file(path: impl Into<String>, size: u64, modified_at: Option<DateTime<Utc>>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
            size,
            modified_at,
        }
    }
}

/// Workspace-scoped file operations.
pub trait FileStore {
    /// Read a file. `Ok(None)` means it does not exist.
    fn read_file(&self, workspace: &str, path: &str) -> Result<Option<String>>;

    /// Create or overwrite a file, creating parent directories.
    fn write_file(&self, workspace: &str, path: &str, content: &str) -> Result<()>;

    /// Delete a file. Deleting a missing file succeeds.
    fn delete_file(&self, workspace: &str, path: &str) -> Result<()>;

    /// Move a file. Fails with a conflict if `to` exists and with not-found
    /// if `from` is missing.
    fn rename_file(&self, workspace: &str, from: &str, to: &str) -> Result<()>;

    /// List every file and directory of the workspace.
    fn list_files(&self, workspace: &str) -> Result<Vec<FileEntry>>;

    /// Check whether a file exists.
    fn exists(&self, workspace: &str, path: &str) -> Result<bool> {
        Ok(self.read_file(workspace, path)?.is_some())
    }

    /// Metadata of a single file, if present.
    fn stat(&self, workspace: &str, path: &str) -> Result<Option<FileEntry>> {
        Ok(self
            .list_files(workspace)?
            .into_iter()
            .find(|entry| !entry.is_dir && entry.path == path))
    }
}

impl<T: FileStore + ?Sized> FileStore for Rc<T> {
    fn read_file(&self, workspace: &str, path: &str) -> Result<Option<String>> {
        (**self).read_file(workspace, path)
    }

    fn write_file(&self, workspace: &str, path: &str, content: &str) -> Result<()> {
        (**self).write_file(workspace, path, content)
    }

    fn delete_file(&self, workspace: &str, path: &str) -> Result<()> {
        (**self).delete_file(workspace, path)
    }

    fn rename_file(&self, workspace: &str, from: &str, to: &str) -> Result<()> {
        (**self).rename_file(workspace, from, to)
    }

    fn list_files(&self, workspace: &str) -> Result<Vec<FileEntry>> {
        (**self).list_files(workspace)
    }

    fn exists(&self, workspace: &str, path: &str) -> Result<bool> {
        (**self).exists(workspace, path)
    }

    fn stat(&self, workspace: &str, path: &str) -> Result<Option<FileEntry>> {
        (**self).stat(workspace, path)
    }
}

/// Normalize a workspace-relative path and reject traversal.
///
/// Leading slashes and `.` segments are dropped; `..`, empty paths and
/// backslashes are rejected.
pub fn normalize_path(path: &str) -> Result<String> {
    let invalid = |reason| crate::Error::InvalidPath {
        path: path.to_string(),
        reason,
    };
    if path.contains('\\') {
        return Err(invalid("backslashes are not allowed"));
    }
    let mut parts = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => return Err(invalid("path escapes the workspace")),
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return Err(invalid("path is required"));
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/host_vars//web.yml").unwrap(), "host_vars/web.yml");
        assert_eq!(normalize_path("./inventory.yml").unwrap(), "inventory.yml");
        assert!(normalize_path("../etc/passwd").is_err());
        assert!(normalize_path("host_vars/../../x").is_err());
        assert!(normalize_path("/").is_err());
        assert!(normalize_path("a\\b").is_err());
    }
}
