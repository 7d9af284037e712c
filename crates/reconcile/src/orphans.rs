//! Orphaned per-alias files.
//!
//! A host-vars document or SSH key is orphaned when its alias no longer
//! appears in the inventory. Scanning never deletes; deletion is a separate
//! call over a list the user has confirmed.

use crate::backend::{FileEntry, FileStore};
use crate::error::Result;
use inventory::paths::classify;
use inventory::{AliasFileKind, RolesByAlias, sanitize_filename};
use std::collections::BTreeSet;

/// A file whose alias is absent from the inventory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct OrphanFile {
    pub alias: String,
    pub path: String,
    pub kind: AliasFileKind,
}

/// Outcome of a batch delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: Vec<String>,
    /// `(path, error message)`
    pub failed: Vec<(String, String)>,
}

impl DeleteReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Classify a listing against the inventory aliases.
///
/// Returns orphans sorted by alias, then path.
pub fn find_orphans(entries: &[FileEntry], inventory: &RolesByAlias) -> Vec<OrphanFile> {
    let known: BTreeSet<String> = inventory.aliases().map(sanitize_filename).collect();

    let mut orphans: Vec<OrphanFile> = entries
        .iter()
        .filter(|entry| !entry.is_dir)
        .filter_map(|entry| {
            let (alias, kind) = classify(&entry.path)?;
            (!known.contains(&alias)).then(|| OrphanFile {
                alias,
                path: entry.path.clone(),
                kind,
            })
        })
        .collect();
    orphans.sort();
    orphans
}

/// Read the listing and the inventory once and find orphaned files.
pub fn scan_orphans(
    store: &dyn FileStore,
    workspace: &str,
    inventory_path: &str,
) -> Result<Vec<OrphanFile>> {
    let entries = store.list_files(workspace)?;
    let roles = match store.read_file(workspace, inventory_path)? {
        Some(content) => inventory::parse_string(&content)?.roles_by_alias(),
        None => RolesByAlias::new(),
    };
    let orphans = find_orphans(&entries, &roles);
    log::debug!(
        "Scanned {} entries against {} aliases: {} orphan(s)",
        entries.len(),
        roles.len(),
        orphans.len()
    );
    Ok(orphans)
}

/// Delete the given files, continuing past failures. Missing files count
/// as deleted.
pub fn delete_orphans(
    store: &dyn FileStore,
    workspace: &str,
    orphans: &[OrphanFile],
) -> DeleteReport {
    let mut report = DeleteReport::default();
    for orphan in orphans {
        match store.delete_file(workspace, &orphan.path) {
            Ok(()) => {
                log::info!("Deleted orphan {}", orphan.path);
                report.deleted.push(orphan.path.clone());
            }
            Err(e) => {
                log::warn!("Failed to delete {}: {e}", orphan.path);
                report.failed.push((orphan.path.clone(), e.to_string()));
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryStore, StoreOp};

    const INVENTORY: &str = "all:\n  hosts:\n    web: {}\n";

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_file("ws", "inventory.yml", INVENTORY)
            .with_file("ws", "host_vars/web.yml", "ansible_host: a\n")
            .with_file("ws", "host_vars/old.yml", "ansible_host: b\n")
            .with_file("ws", "secrets/ssh_keys/old", "KEY")
            .with_file("ws", "secrets/ssh_keys/old.pub", "PUB")
            .with_file("ws", "secrets/ssh_keys/web.pub", "PUB")
            .with_file("ws", "secrets/ssh_keys/zed.pub", "PUB")
            .with_file("ws", "group_vars/all.yml", "x: 1\n")
    }

    #[test]
    fn test_scan_finds_sorted_orphans() {
        let store = store();
        let orphans = scan_orphans(&store, "ws", "inventory.yml").unwrap();
        let paths: Vec<_> = orphans.iter().map(|o| o.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "host_vars/old.yml",
                "secrets/ssh_keys/old",
                "secrets/ssh_keys/old.pub",
                "secrets/ssh_keys/zed.pub",
            ]
        );
        assert_eq!(orphans[0].kind, AliasFileKind::HostVars);
        assert_eq!(orphans[3].alias, "zed");
    }

    #[test]
    fn test_scan_reads_once() {
        let store = store();
        scan_orphans(&store, "ws", "inventory.yml").unwrap();
        assert_eq!(store.count(StoreOp::List), 1);
        assert_eq!(store.count(StoreOp::Read), 1);
    }

    #[test]
    fn test_missing_inventory_orphans_everything() {
        let store = MemoryStore::new().with_file("ws", "host_vars/web.yml", "a: 1\n");
        let orphans = scan_orphans(&store, "ws", "inventory.yml").unwrap();
        assert_eq!(orphans.len(), 1);
    }

    #[test]
    fn test_broken_inventory_is_an_error() {
        let store = MemoryStore::new()
            .with_file("ws", "inventory.yml", "- not\n- a mapping\n")
            .with_file("ws", "host_vars/web.yml", "a: 1\n");
        assert!(scan_orphans(&store, "ws", "inventory.yml").is_err());
    }

    #[test]
    fn test_delete_continues_past_failures() {
        let store = store();
        let orphans = scan_orphans(&store, "ws", "inventory.yml").unwrap();
        store.fail_next(StoreOp::Delete, "secrets/ssh_keys/old");

        let report = delete_orphans(&store, "ws", &orphans);
        assert!(!report.is_complete());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.deleted.len(), 3);
        assert!(store.contains("ws", "host_vars/web.yml"));
    }
}
