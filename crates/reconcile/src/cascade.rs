//! Alias rename, delete and purge.
//!
//! Requests are validated up front, before any I/O, then queued and run
//! one at a time. A cascade keeps going past failed steps, reports them
//! together as [`Error::Cascade`], and is acknowledged either way.
//!
//! | step                 | rename | delete | purge |
//! |----------------------|--------|--------|-------|
//! | inventory entry      | rename | remove | remove|
//! | selection + registry | rename | remove | remove|
//! | host vars, SSH keys  | move   | keep   | delete|
//! | listing refresh      | yes    | yes    | yes   |
//!
//! An inventory step that fails, or cannot run before the inventory is
//! loaded, is kept as an [`InventoryRepair`] and replayed by the next
//! selection-to-inventory pass, so the old alias is never written back.

use crate::engine::Reconciler;
use crate::error::{Error, Result};
use crate::queue::AliasMutation;
use inventory::{AliasPaths, validate_alias};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Rename `from` to `to` everywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRequest {
    pub from: String,
    pub to: String,
}

impl RenameRequest {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Forget a host, keeping its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub alias: String,
}

/// Forget a host and delete its host vars and SSH keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeRequest {
    pub alias: String,
}

impl From<RenameRequest> for AliasMutation {
    fn from(request: RenameRequest) -> Self {
        AliasMutation::Rename {
            from: request.from,
            to: request.to,
        }
    }
}

impl From<DeleteRequest> for AliasMutation {
    fn from(request: DeleteRequest) -> Self {
        AliasMutation::Delete {
            alias: request.alias,
        }
    }
}

impl From<PurgeRequest> for AliasMutation {
    fn from(request: PurgeRequest) -> Self {
        AliasMutation::Purge {
            alias: request.alias,
        }
    }
}

/// An inventory edit a cascade still owes the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum InventoryRepair {
    Rename { from: String, to: String },
    Remove { alias: String },
}

impl InventoryRepair {
    /// The alias this repair takes out of the inventory.
    pub fn departing(&self) -> &str {
        match self {
            Self::Rename { from, .. } => from,
            Self::Remove { alias } => alias,
        }
    }
}

impl fmt::Display for InventoryRepair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rename { from, to } => write!(f, "rename {from} -> {to}"),
            Self::Remove { alias } => write!(f, "removal of {alias}"),
        }
    }
}

impl Reconciler {
    /// Rename a host. Fails without touching anything if `to` is invalid
    /// or already in use.
    ///
    /// Repeating a rename whose inventory step failed is allowed: `to` is
    /// taken only by that earlier, partial rename.
    pub fn rename_host(&self, request: RenameRequest) -> Result<()> {
        self.require_workspace()?;
        if request.from == request.to {
            return Err(Error::SameAlias(request.to));
        }
        validate_alias(&request.to)?;
        self.require_known(&request.from)?;
        let retry = self.rename_pending(&request.from, &request.to);
        if (self.alias_taken(&request.to) && !retry) || self.queue.borrow().touches(&request.to) {
            return Err(Error::DuplicateAlias(request.to));
        }
        self.submit(request.into())
    }

    /// Remove a host from the inventory, selection and registry.
    pub fn delete_host(&self, request: DeleteRequest) -> Result<()> {
        self.require_workspace()?;
        self.require_known(&request.alias)?;
        self.submit(request.into())
    }

    /// Delete a host and its host vars and SSH keys.
    pub fn purge_host(&self, request: PurgeRequest) -> Result<()> {
        self.require_workspace()?;
        self.require_known(&request.alias)?;
        self.submit(request.into())
    }

    /// Queue a mutation without validating it and run the queue.
    pub fn enqueue(&self, mutation: AliasMutation) {
        self.queue.borrow_mut().push(mutation);
        self.process_mutations();
    }

    pub fn pending_mutations(&self) -> Vec<AliasMutation> {
        self.queue.borrow().iter().cloned().collect()
    }

    fn submit(&self, mutation: AliasMutation) -> Result<()> {
        self.queue.borrow_mut().push(mutation.clone());
        self.process_mutations()
            .into_iter()
            .find(|(done, _)| *done == mutation)
            .map_or(Ok(()), |(_, result)| result)
    }

    /// Drain the queue in FIFO order.
    ///
    /// Every entry is acknowledged exactly once, whether its cascade
    /// succeeded or not. Returns nothing if the queue is already being
    /// drained further up the stack.
    pub fn process_mutations(&self) -> Vec<(AliasMutation, Result<()>)> {
        let Some(token) = self.flags.mutation.try_acquire() else {
            return Vec::new();
        };

        let mut results = Vec::new();
        loop {
            let Some(mutation) = self.queue.borrow().front().cloned() else {
                break;
            };
            let result = match &mutation {
                AliasMutation::Rename { from, to } => self.cascade_rename(from, to),
                AliasMutation::Delete { alias } => self.cascade_delete(alias, false),
                AliasMutation::Purge { alias } => self.cascade_delete(alias, true),
            };

            // A workspace switch inside the cascade acknowledges for us
            let still_queued = self.queue.borrow().front() == Some(&mutation);
            if still_queued {
                self.queue.borrow_mut().acknowledge(1);
                let error = result.as_ref().err().map(ToString::to_string);
                self.observer
                    .mutation_acknowledged(&mutation, error.as_deref());
            }
            results.push((mutation, result));
        }
        drop(token);

        if !results.is_empty() {
            self.on_selection_changed();
        }
        results
    }

    fn require_known(&self, alias: &str) -> Result<()> {
        if self.alias_taken(alias) {
            Ok(())
        } else {
            Err(Error::UnknownAlias(alias.to_string()))
        }
    }

    fn rename_pending(&self, from: &str, to: &str) -> bool {
        self.repairs.borrow().iter().any(|repair| {
            matches!(repair, InventoryRepair::Rename { from: f, to: t } if f == from && t == to)
        })
    }

    fn settle_repair(&self, repair: &InventoryRepair) {
        self.repairs.borrow_mut().retain(|pending| pending != repair);
    }

    fn owe_repair(&self, repair: InventoryRepair) {
        let mut repairs = self.repairs.borrow_mut();
        if !repairs.contains(&repair) {
            log::debug!("Deferring {repair} until the next inventory write");
            repairs.push(repair);
        }
    }

    fn cascade_rename(&self, from: &str, to: &str) -> Result<()> {
        let ws = self.require_workspace()?;
        if self.alias_taken(to) && !self.rename_pending(from, to) {
            return Err(Error::DuplicateAlias(to.to_string()));
        }
        let repair = InventoryRepair::Rename {
            from: from.to_string(),
            to: to.to_string(),
        };
        let mut failures = Vec::new();

        self.selection.borrow_mut().rename_alias(from, to);
        self.hosts.borrow_mut().rename(from, to);
        {
            let mut active = self.active_alias.borrow_mut();
            if active.as_deref() == Some(from) {
                *active = Some(to.to_string());
            }
        }
        self.host_vars_timers
            .borrow_mut()
            .rekey(&(ws.clone(), from.to_string()), (ws.clone(), to.to_string()));

        if !self.inventory_ready() {
            self.owe_repair(repair);
        } else if let Err(e) = self.rename_in_inventory(&ws, from, to) {
            failures.push(format!("inventory: {e}"));
            self.owe_repair(repair);
        } else {
            self.settle_repair(&repair);
        }

        let mut moved = Vec::new();
        let source = AliasPaths::for_alias(from);
        let target = AliasPaths::for_alias(to);
        match self.store.list_files(&ws) {
            Ok(entries) => {
                let existing: BTreeSet<&str> = entries
                    .iter()
                    .filter(|entry| !entry.is_dir)
                    .map(|entry| entry.path.as_str())
                    .collect();
                let pairs = source.entries().into_iter().zip(target.entries());
                for ((kind, src), (_, dst)) in pairs {
                    if !existing.contains(src) {
                        continue;
                    }
                    if existing.contains(dst) {
                        failures.push(format!("{kind}: {dst} already exists"));
                        continue;
                    }
                    match self.store.rename_file(&ws, src, dst) {
                        Ok(()) => {
                            log::info!("Moved {src} -> {dst}");
                            moved.push((src.to_string(), dst.to_string()));
                        }
                        Err(e) => failures.push(format!("{kind}: {e}")),
                    }
                }
            }
            Err(e) => failures.push(format!("listing: {e}")),
        }

        if let Err(e) = self.refresh_listing() {
            failures.push(format!("refresh: {e}"));
        }
        let mut editor = self.editor.borrow_mut();
        for (src, dst) in &moved {
            editor.repoint(&ws, src, dst);
        }
        drop(editor);

        Self::finish("rename", from, failures)
    }

    fn rename_in_inventory(&self, ws: &str, from: &str, to: &str) -> Result<()> {
        let (mut doc, _) = self.read_inventory(ws)?;
        if !doc.rename_alias(from, to) {
            if doc.roles_by_alias().contains_alias(to) {
                return Err(Error::DuplicateAlias(to.to_string()));
            }
            return Ok(());
        }
        let yaml = doc.to_yaml()?;
        self.store
            .write_file(ws, &self.config.inventory_path, &yaml)?;
        self.inventory.borrow_mut().snapshot = Some(doc.roles_by_alias());
        log::info!("Renamed {from} -> {to} in {}", self.config.inventory_path);
        Ok(())
    }

    fn cascade_delete(&self, alias: &str, purge: bool) -> Result<()> {
        let ws = self.require_workspace()?;
        let _token = self.flags.delete_in_flight.try_acquire();
        let operation = if purge { "purge" } else { "delete" };
        let mut failures = Vec::new();
        let repair = InventoryRepair::Remove {
            alias: alias.to_string(),
        };

        if !self.inventory_ready() {
            self.owe_repair(repair);
        } else if let Err(e) = self.remove_from_inventory(&ws, alias) {
            failures.push(format!("inventory: {e}"));
            self.owe_repair(repair);
        } else {
            self.settle_repair(&repair);
        }

        self.selection.borrow_mut().remove_alias(alias);
        self.hosts.borrow_mut().remove(alias);
        self.host_vars_timers
            .borrow_mut()
            .cancel(&(ws.clone(), alias.to_string()));
        {
            let mut active = self.active_alias.borrow_mut();
            if active.as_deref() == Some(alias) {
                *active = None;
            }
        }

        if purge {
            for (kind, path) in AliasPaths::for_alias(alias).entries() {
                match self.store.delete_file(&ws, path) {
                    Ok(()) => {
                        if self.editor.borrow_mut().close_if(&ws, path) {
                            log::debug!("Closed {path}: file purged");
                        }
                    }
                    Err(e) => failures.push(format!("{kind}: {e}")),
                }
            }
        }

        if let Err(e) = self.refresh_listing() {
            failures.push(format!("refresh: {e}"));
        }
        Self::finish(operation, alias, failures)
    }

    fn remove_from_inventory(&self, ws: &str, alias: &str) -> Result<()> {
        let (mut doc, _) = self.read_inventory(ws)?;
        if !doc.remove_alias(alias) {
            return Ok(());
        }
        let yaml = doc.to_yaml()?;
        self.store
            .write_file(ws, &self.config.inventory_path, &yaml)?;
        self.inventory.borrow_mut().snapshot = Some(doc.roles_by_alias());
        log::info!("Removed {alias} from {}", self.config.inventory_path);
        Ok(())
    }

    fn finish(operation: &'static str, alias: &str, failures: Vec<String>) -> Result<()> {
        if failures.is_empty() {
            log::info!("{operation} {alias} done");
            return Ok(());
        }
        Err(Error::Cascade {
            operation,
            alias: alias.to_string(),
            failures,
        })
    }
}
