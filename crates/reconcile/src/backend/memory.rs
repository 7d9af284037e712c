//! In-memory backend for tests and dry runs.
//!
//! Modification times come from a logical clock that advances on every
//! write, so timestamp polling behaves deterministically. Failures can be
//! injected per operation and path prefix, and every call is logged.

use super::{FileEntry, FileStore, normalize_path};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Store operation kinds, for logging and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Read,
    Write,
    Delete,
    Rename,
    List,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOp::Read => "read",
            StoreOp::Write => "write",
            StoreOp::Delete => "delete",
            StoreOp::Rename => "rename",
            StoreOp::List => "list",
        };
        f.write_str(name)
    }
}

/// A logged store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedOp {
    pub op: StoreOp,
    pub workspace: String,
    /// Path (source path for renames, empty for listings)
    pub path: String,
}

#[derive(Debug, Clone)]
struct StoredFile {
    content: String,
    tick: i64,
}

#[derive(Debug, Clone)]
struct Failure {
    op: StoreOp,
    path_prefix: String,
    /// `None` fails forever
    remaining: Option<usize>,
}

/// File store kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: RefCell<BTreeMap<(String, String), StoredFile>>,
    clock: Cell<i64>,
    failures: RefCell<Vec<Failure>>,
    log: RefCell<Vec<LoggedOp>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_file(self, workspace: &str, path: &str, content: &str) -> Self {
        self.insert(workspace, path, content);
        self
    }

    /// Put a file in place without logging the write.
    pub fn insert(&self, workspace: &str, path: &str, content: &str) {
        let tick = self.advance();
        self.files.borrow_mut().insert(
            (workspace.to_string(), path.to_string()),
            StoredFile {
                content: content.to_string(),
                tick,
            },
        );
    }

    /// Current content of a file.
    pub fn content(&self, workspace: &str, path: &str) -> Option<String> {
        self.files
            .borrow()
            .get(&(workspace.to_string(), path.to_string()))
            .map(|f| f.content.clone())
    }

    /// Whether a file exists, without logging.
    pub fn contains(&self, workspace: &str, path: &str) -> bool {
        self.content(workspace, path).is_some()
    }

    /// Every file path of a workspace, sorted.
    pub fn paths(&self, workspace: &str) -> Vec<String> {
        self.files
            .borrow()
            .keys()
            .filter(|(ws, _)| ws == workspace)
            .map(|(_, path)| path.clone())
            .collect()
    }

    /// Fail the next `op` on a path starting with `path_prefix`.
    pub fn fail_next(&self, op: StoreOp, path_prefix: &str) {
        self.failures.borrow_mut().push(Failure {
            op,
            path_prefix: path_prefix.to_string(),
            remaining: Some(1),
        });
    }

    /// Fail every `op` on paths starting with `path_prefix`.
    pub fn fail_always(&self, op: StoreOp, path_prefix: &str) {
        self.failures.borrow_mut().push(Failure {
            op,
            path_prefix: path_prefix.to_string(),
            remaining: None,
        });
    }

    /// Remove every injected failure.
    pub fn clear_failures(&self) {
        self.failures.borrow_mut().clear();
    }

    /// Every call so far, oldest first.
    pub fn operations(&self) -> Vec<LoggedOp> {
        self.log.borrow().clone()
    }

    /// Number of logged calls of one kind.
    pub fn count(&self, op: StoreOp) -> usize {
        self.log.borrow().iter().filter(|l| l.op == op).count()
    }

    /// Number of logged writes to one path.
    pub fn writes_to(&self, path: &str) -> usize {
        self.log
            .borrow()
            .iter()
            .filter(|l| l.op == StoreOp::Write && l.path == path)
            .count()
    }

    /// Forget logged calls.
    pub fn clear_log(&self) {
        self.log.borrow_mut().clear();
    }

    fn advance(&self) -> i64 {
        let tick = self.clock.get() + 1;
        self.clock.set(tick);
        tick
    }

    fn record(&self, op: StoreOp, workspace: &str, path: &str) -> Result<()> {
        self.log.borrow_mut().push(LoggedOp {
            op,
            workspace: workspace.to_string(),
            path: path.to_string(),
        });

        let mut failures = self.failures.borrow_mut();
        let Some(index) = failures
            .iter()
            .position(|f| f.op == op && path.starts_with(&f.path_prefix))
        else {
            return Ok(());
        };
        if let Some(remaining) = failures[index].remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                failures.remove(index);
            }
        }
        Err(Error::Unavailable(format!("injected {op} failure for '{path}'")))
    }

    fn key(workspace: &str, path: &str) -> Result<(String, String)> {
        Ok((workspace.to_string(), normalize_path(path)?))
    }
}

impl FileStore for MemoryStore {
    fn read_file(&self, workspace: &str, path: &str) -> Result<Option<String>> {
        let key = Self::key(workspace, path)?;
        self.record(StoreOp::Read, workspace, &key.1)?;
        Ok(self.files.borrow().get(&key).map(|f| f.content.clone()))
    }

    fn write_file(&self, workspace: &str, path: &str, content: &str) -> Result<()> {
        let key = Self::key(workspace, path)?;
        self.record(StoreOp::Write, workspace, &key.1)?;
        let tick = self.advance();
        self.files.borrow_mut().insert(
            key,
            StoredFile {
                content: content.to_string(),
                tick,
            },
        );
        Ok(())
    }

    fn delete_file(&self, workspace: &str, path: &str) -> Result<()> {
        let key = Self::key(workspace, path)?;
        self.record(StoreOp::Delete, workspace, &key.1)?;
        self.files.borrow_mut().remove(&key);
        Ok(())
    }

    fn rename_file(&self, workspace: &str, from: &str, to: &str) -> Result<()> {
        let source = Self::key(workspace, from)?;
        let target = Self::key(workspace, to)?;
        self.record(StoreOp::Rename, workspace, &source.1)?;

        let mut files = self.files.borrow_mut();
        if files.contains_key(&target) {
            return Err(Error::Conflict { path: target.1 });
        }
        let Some(mut file) = files.remove(&source) else {
            return Err(Error::NotFound { path: source.1 });
        };
        file.tick = self.advance();
        files.insert(target, file);
        Ok(())
    }

    fn list_files(&self, workspace: &str) -> Result<Vec<FileEntry>> {
        self.record(StoreOp::List, workspace, "")?;

        let files = self.files.borrow();
        let mut dirs = BTreeSet::new();
        let mut entries = Vec::new();
        for ((ws, path), file) in files.iter() {
            if ws != workspace {
                continue;
            }
            let mut parent = path.as_str();
            while let Some((dir, _)) = parent.rsplit_once('/') {
                dirs.insert(dir.to_string());
                parent = dir;
            }
            entries.push(FileEntry::file(
                path.clone(),
                file.content.len() as u64,
                DateTime::<Utc>::from_timestamp(file.tick, 0),
            ));
        }

        let mut listing: Vec<FileEntry> = dirs
            .into_iter()
            .map(|path| FileEntry {
                path,
                is_dir: true,
                size: 0,
                modified_at: None,
            })
            .collect();
        listing.extend(entries);
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mtime_advances_on_write() {
        let store = MemoryStore::new();
        store.write_file("ws", "inventory.yml", "a").unwrap();
        let first = store.stat("ws", "inventory.yml").unwrap().unwrap().modified_at;
        store.write_file("ws", "inventory.yml", "b").unwrap();
        let second = store.stat("ws", "inventory.yml").unwrap().unwrap().modified_at;
        assert!(second > first);
    }

    #[test]
    fn test_listing_includes_parent_dirs() {
        let store = MemoryStore::new().with_file("ws", "secrets/ssh_keys/web", "key");
        let listing = store.list_files("ws").unwrap();
        let dirs: Vec<_> = listing.iter().filter(|e| e.is_dir).map(|e| e.path.as_str()).collect();
        assert_eq!(dirs, vec!["secrets", "secrets/ssh_keys"]);
        assert!(store.list_files("other").unwrap().is_empty());
    }

    #[test]
    fn test_fail_next_only_once() {
        let store = MemoryStore::new();
        store.fail_next(StoreOp::Write, "host_vars/");
        assert!(store.write_file("ws", "host_vars/web.yml", "x").is_err());
        assert!(store.write_file("ws", "host_vars/web.yml", "x").is_ok());
        assert!(store.write_file("ws", "inventory.yml", "x").is_ok());
        assert_eq!(store.writes_to("host_vars/web.yml"), 2);
    }

    #[test]
    fn test_fail_always() {
        let store = MemoryStore::new();
        store.fail_always(StoreOp::Read, "");
        assert!(store.read_file("ws", "a").unwrap_err().is_retryable());
        assert!(store.read_file("ws", "b").is_err());
        store.clear_failures();
        assert_eq!(store.read_file("ws", "b").unwrap(), None);
    }

    #[test]
    fn test_rename_semantics() {
        let store = MemoryStore::new()
            .with_file("ws", "a", "1")
            .with_file("ws", "b", "2");
        assert!(matches!(
            store.rename_file("ws", "a", "b").unwrap_err(),
            Error::Conflict { .. }
        ));
        assert!(matches!(
            store.rename_file("ws", "missing", "c").unwrap_err(),
            Error::NotFound { .. }
        ));
        store.rename_file("ws", "a", "c").unwrap();
        assert_eq!(store.paths("ws"), vec!["b", "c"]);
    }
}
