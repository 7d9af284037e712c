//! The reconciler.
//!
//! [`Reconciler`] owns the per-workspace state (selection, host registry,
//! inventory snapshot, open document, timers) and runs the two sync
//! directions:
//!
//! - **A**, selection to inventory: merge the selection into the inventory
//!   file and write it when the canonical mapping changed.
//! - **B**, inventory to selection: seed the selection from the file on the
//!   first pass, then apply only the differences since the last pass.
//!
//! Both directions share one guard. Everything runs on the caller's thread;
//! time is injected through [`Reconciler::tick`].

use crate::autosave::{AutosaveController, DocState, NavAction, NavDecision, OpenDocument};
use crate::backend::{FileEntry, FileStore, normalize_path};
use crate::cascade::InventoryRepair;
use crate::debounce::Debouncer;
use crate::error::{Error, Result};
use crate::guard::SyncFlags;
use crate::hosts::{HostRecord, HostRegistry};
use crate::observer::{NoObserver, SyncObserver};
use crate::queue::MutationQueue;
use crate::selection::SelectionStore;
use crate::types::{PassOutcome, ReconcileConfig, SkipReason};
use chrono::{DateTime, Utc};
use inventory::{InventoryDocument, RoleChange, RolesByAlias, diff_roles};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Instant;

// ============================================================================
// State
// ============================================================================

/// Persistable state of one workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceState {
    #[serde(default)]
    pub selection: SelectionStore,
    #[serde(default)]
    pub hosts: HostRegistry,
    /// Inventory mapping seen by the last completed pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_snapshot: Option<RolesByAlias>,
    /// Cascade edits the inventory has not received yet
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repairs: Vec<InventoryRepair>,
}

/// What the engine knows about the inventory file.
#[derive(Debug, Default)]
pub(crate) struct InventoryState {
    pub ready: bool,
    pub error: Option<String>,
    pub snapshot: Option<RolesByAlias>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// Point-in-time summary of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub workspace: Option<String>,
    pub online: bool,
    pub inventory_ready: bool,
    pub seeded: bool,
    pub sync_error: Option<String>,
    pub pending_mutations: usize,
    pub pending_host_vars: usize,
    pub document: Option<DocState>,
}

/// What a [`Reconciler::tick`] flushed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Aliases whose host-vars file was written
    pub host_vars_written: Vec<String>,
    /// `(alias, error message)`
    pub host_vars_failed: Vec<(String, String)>,
    /// Autosave result, if the document timer fired
    pub document: Option<std::result::Result<(), String>>,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.host_vars_written.is_empty()
            && self.host_vars_failed.is_empty()
            && self.document.is_none()
    }
}

/// Sync engine for one session.
pub struct Reconciler {
    pub(crate) store: Rc<dyn FileStore>,
    pub(crate) config: ReconcileConfig,
    pub(crate) observer: Rc<dyn SyncObserver>,
    pub(crate) flags: SyncFlags,
    pub(crate) workspace: RefCell<Option<String>>,
    pub(crate) online: Cell<bool>,
    pub(crate) selection: RefCell<SelectionStore>,
    pub(crate) hosts: RefCell<HostRegistry>,
    pub(crate) queue: RefCell<MutationQueue>,
    pub(crate) inventory: RefCell<InventoryState>,
    pub(crate) editor: RefCell<AutosaveController>,
    pub(crate) host_vars_timers: RefCell<Debouncer<(String, String)>>,
    pub(crate) active_alias: RefCell<Option<String>>,
    pub(crate) listing: RefCell<Vec<FileEntry>>,
    pub(crate) repairs: RefCell<Vec<InventoryRepair>>,
    synced_revision: Cell<Option<u64>>,
}

impl Reconciler {
    pub fn new(store: Rc<dyn FileStore>, config: ReconcileConfig) -> Self {
        Self {
            store,
            observer: Rc::new(NoObserver),
            flags: SyncFlags::new(),
            workspace: RefCell::new(None),
            online: Cell::new(true),
            selection: RefCell::new(SelectionStore::new()),
            hosts: RefCell::new(HostRegistry::new()),
            queue: RefCell::new(MutationQueue::new()),
            inventory: RefCell::new(InventoryState::default()),
            editor: RefCell::new(AutosaveController::new(config.autosave_debounce)),
            host_vars_timers: RefCell::new(Debouncer::new(config.host_vars_debounce)),
            active_alias: RefCell::new(None),
            listing: RefCell::new(Vec::new()),
            repairs: RefCell::new(Vec::new()),
            synced_revision: Cell::new(None),
            config,
        }
    }

    /// Replace the observer.
    pub fn with_observer(mut self, observer: Rc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    // ========================================================================
    // Workspace and connectivity
    // ========================================================================

    /// Switch to `workspace` with empty state and run direction B.
    pub fn switch_workspace(&self, workspace: &str) -> PassOutcome {
        self.open_workspace(workspace, WorkspaceState::default())
    }

    /// Switch to `workspace`, restoring saved state, and run direction B.
    ///
    /// A restored inventory snapshot counts as seeded, so the first pass
    /// applies only what changed in the file since the state was saved.
    /// Mutations still queued for the previous workspace are acknowledged
    /// with an error.
    ///
    /// While the open document has unsaved edits a switch to another
    /// workspace is deferred: it becomes the pending navigation and nothing
    /// changes until [`Self::save_and_continue`] or
    /// [`Self::discard_and_continue`] hands the action back.
    pub fn open_workspace(&self, workspace: &str, state: WorkspaceState) -> PassOutcome {
        let switching = !self.is_current(workspace);
        if switching && self.editor.borrow().is_dirty() {
            self.editor
                .borrow_mut()
                .request(NavAction::SwitchWorkspace(workspace.to_string()));
            log::info!("Switch to {workspace} deferred: unsaved edits");
            return PassOutcome::Skipped(SkipReason::UnsavedDocument);
        }

        let previous = self.workspace.replace(Some(workspace.to_string()));
        if switching {
            if let Some(previous) = &previous {
                log::info!("Switching workspace {previous} -> {workspace}");
            }
            let dropped = self.queue.borrow_mut().acknowledge(usize::MAX);
            for mutation in &dropped {
                self.observer
                    .mutation_acknowledged(mutation, Some("workspace changed"));
            }
            self.host_vars_timers
                .borrow_mut()
                .cancel_where(|(ws, _)| ws != workspace);
            self.editor.borrow_mut().close();
        }

        self.flags.reset();
        let seeded = state.inventory_snapshot.is_some();
        *self.selection.borrow_mut() = state.selection;
        *self.hosts.borrow_mut() = state.hosts;
        *self.repairs.borrow_mut() = state.repairs;
        let (was_ready, had_error) = {
            let mut inventory = self.inventory.borrow_mut();
            let previous = std::mem::replace(
                &mut *inventory,
                InventoryState {
                    snapshot: state.inventory_snapshot,
                    ..InventoryState::default()
                },
            );
            (previous.ready, previous.error.is_some())
        };
        if seeded {
            self.flags.mark_seeded();
        }
        *self.active_alias.borrow_mut() = None;
        self.listing.borrow_mut().clear();
        self.synced_revision.set(None);

        if was_ready {
            self.observer.inventory_ready_changed(false);
        }
        if had_error {
            self.observer.sync_error(None);
        }
        self.sync_inventory_to_selection()
    }

    /// Save-able state of the current workspace.
    pub fn export_state(&self) -> WorkspaceState {
        WorkspaceState {
            selection: self.selection.borrow().clone(),
            hosts: self.hosts.borrow().clone(),
            inventory_snapshot: self.inventory.borrow().snapshot.clone(),
            repairs: self.repairs.borrow().clone(),
        }
    }

    pub fn workspace(&self) -> Option<String> {
        self.workspace.borrow().clone()
    }

    pub(crate) fn require_workspace(&self) -> Result<String> {
        self.workspace().ok_or(Error::NoWorkspace)
    }

    pub(crate) fn is_current(&self, workspace: &str) -> bool {
        self.workspace.borrow().as_deref() == Some(workspace)
    }

    /// Record connectivity. Coming online runs direction A.
    pub fn set_connectivity(&self, online: bool) -> PassOutcome {
        let was_online = self.online.replace(online);
        if !online {
            return PassOutcome::Skipped(SkipReason::Offline);
        }
        if was_online {
            return PassOutcome::Unchanged;
        }
        log::info!("Connectivity restored");
        self.sync_selection_to_inventory()
    }

    pub fn is_online(&self) -> bool {
        self.online.get()
    }

    /// Focus a host. Pulls its host-vars into the registry and runs
    /// direction B.
    pub fn set_active_alias(&self, alias: Option<&str>) -> PassOutcome {
        *self.active_alias.borrow_mut() = alias.map(str::to_string);
        if let Some(alias) = alias
            && let Err(e) = self.pull_host_vars(alias)
        {
            log::warn!("Could not read host vars of {alias}: {e}");
        }
        self.sync_inventory_to_selection()
    }

    pub fn active_alias(&self) -> Option<String> {
        self.active_alias.borrow().clone()
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Edit the selection, then run direction A if it changed.
    pub fn edit_selection<R>(&self, edit: impl FnOnce(&mut SelectionStore) -> R) -> R {
        let result = edit(&mut self.selection.borrow_mut());
        self.on_selection_changed();
        result
    }

    /// Run direction A if the selection changed since it last ran.
    pub fn on_selection_changed(&self) -> PassOutcome {
        let revision = self.selection.borrow().revision();
        if self.synced_revision.get() == Some(revision) {
            return PassOutcome::Unchanged;
        }
        self.sync_selection_to_inventory()
    }

    pub fn selection(&self) -> SelectionStore {
        self.selection.borrow().clone()
    }

    pub fn hosts(&self) -> HostRegistry {
        self.hosts.borrow().clone()
    }

    pub fn host(&self, alias: &str) -> Option<HostRecord> {
        self.hosts.borrow().get(alias).cloned()
    }

    /// Inventory mapping seen by the last pass.
    pub fn inventory_roles(&self) -> Option<RolesByAlias> {
        self.inventory.borrow().snapshot.clone()
    }

    pub fn inventory_ready(&self) -> bool {
        self.inventory.borrow().ready
    }

    pub fn sync_error(&self) -> Option<String> {
        self.inventory.borrow().error.clone()
    }

    pub fn status(&self) -> EngineStatus {
        let inventory = self.inventory.borrow();
        EngineStatus {
            workspace: self.workspace(),
            online: self.online.get(),
            inventory_ready: inventory.ready,
            seeded: self.flags.is_seeded(),
            sync_error: inventory.error.clone(),
            pending_mutations: self.queue.borrow().len(),
            pending_host_vars: self.host_vars_timers.borrow().len(),
            document: self.editor.borrow().state().cloned(),
        }
    }

    // ========================================================================
    // Direction A: selection -> inventory
    // ========================================================================

    /// Merge the selection into the inventory and write it if the
    /// canonical mapping changed.
    ///
    /// The merge starts from the inventory's mapping, overlays the
    /// selection (selection wins per alias) and adds every registered
    /// alias. It never removes an alias on its own; only the renames and
    /// removals a cascade could not write itself are replayed here.
    pub fn sync_selection_to_inventory(&self) -> PassOutcome {
        let Some(ws) = self.workspace() else {
            return PassOutcome::Skipped(SkipReason::NoWorkspace);
        };
        if !self.online.get() {
            return PassOutcome::Skipped(SkipReason::Offline);
        }
        if self.mutation_pending() {
            return PassOutcome::Skipped(SkipReason::MutationPending);
        }
        if self.inventory_is_dirty(&ws) {
            return PassOutcome::Skipped(SkipReason::InventoryDirty);
        }
        let Some(_token) = self.flags.inventory.try_acquire() else {
            return PassOutcome::Skipped(SkipReason::Busy);
        };

        let (mut doc, content) = match self.read_inventory(&ws) {
            Ok(read) => read,
            Err(e) => return self.fail(&ws, &e),
        };
        if !self.is_current(&ws) {
            return PassOutcome::Superseded;
        }
        let current = doc.roles_by_alias();
        self.set_ready(true);

        let imported = if self.flags.is_seeded() {
            Vec::new()
        } else {
            self.seed(&current).1
        };
        let repaired = self.apply_repairs(&mut doc);
        let base = if repaired {
            doc.roles_by_alias()
        } else {
            current.clone()
        };
        let revision = self.selection.borrow().revision();
        let merged = self.merged_roles(&base);

        if !repaired && merged == current {
            self.inventory.borrow_mut().snapshot = Some(current);
            self.synced_revision.set(Some(revision));
            self.repairs.borrow_mut().clear();
            self.clear_error();
            self.pull_imported(&imported);
            return PassOutcome::Unchanged;
        }

        doc.apply_roles(&merged);
        let yaml = match doc.to_yaml() {
            Ok(yaml) => yaml,
            Err(e) => return self.fail(&ws, &e.into()),
        };
        let unchanged_text = content
            .as_deref()
            .is_some_and(|c| blake3::hash(c.as_bytes()) == blake3::hash(yaml.as_bytes()));
        if !unchanged_text {
            if let Err(e) = self
                .store
                .write_file(&ws, &self.config.inventory_path, &yaml)
            {
                return self.fail(&ws, &e);
            }
            if !self.is_current(&ws) {
                return PassOutcome::Superseded;
            }
            log::info!(
                "Wrote {} ({} host(s))",
                self.config.inventory_path,
                merged.len()
            );
        }

        self.inventory.borrow_mut().snapshot = Some(merged.clone());
        self.synced_revision.set(Some(revision));
        self.repairs.borrow_mut().clear();
        self.clear_error();
        self.pull_imported(&imported);
        self.observer.roles_changed(&merged);
        PassOutcome::Applied
    }

    /// Replay pending cascade edits onto the document. True if any applied.
    fn apply_repairs(&self, doc: &mut InventoryDocument) -> bool {
        let mut changed = false;
        for repair in self.repairs.borrow().iter() {
            let applied = match repair {
                InventoryRepair::Rename { from, to } => doc.rename_alias(from, to),
                InventoryRepair::Remove { alias } => doc.remove_alias(alias),
            };
            if applied {
                log::info!("Replaying {repair} in {}", self.config.inventory_path);
            }
            changed |= applied;
        }
        changed
    }

    fn merged_roles(&self, current: &RolesByAlias) -> RolesByAlias {
        let mut merged = current.clone();
        for (alias, roles) in self.selection.borrow().roles().iter() {
            merged.set_roles(alias, roles.clone());
        }
        for alias in self.hosts.borrow().aliases() {
            merged.insert_alias(alias);
        }
        merged
    }

    // ========================================================================
    // Direction B: inventory -> selection
    // ========================================================================

    /// Bring inventory changes into the selection, then run direction A if
    /// the selection now holds something the file lacks.
    pub fn sync_inventory_to_selection(&self) -> PassOutcome {
        let outcome = self.pull_inventory(None);
        if matches!(outcome, PassOutcome::Applied | PassOutcome::Unchanged) {
            self.on_selection_changed();
        }
        outcome
    }

    /// Run direction B only if the inventory's modification time changed
    /// since the last pass.
    pub fn poll(&self) -> PassOutcome {
        let Some(ws) = self.workspace() else {
            return PassOutcome::Skipped(SkipReason::NoWorkspace);
        };
        if !self.online.get() {
            return PassOutcome::Skipped(SkipReason::Offline);
        }
        let entry = match self.store.stat(&ws, &self.config.inventory_path) {
            Ok(entry) => entry,
            Err(e) => return self.fail(&ws, &e),
        };
        let observed = entry.and_then(|e| e.modified_at);
        let unchanged = {
            let inventory = self.inventory.borrow();
            inventory.ready && inventory.modified_at == observed
        };
        if unchanged {
            return PassOutcome::Unchanged;
        }

        log::debug!("Inventory modified at {observed:?}");
        let outcome = self.pull_inventory(observed);
        if matches!(outcome, PassOutcome::Applied | PassOutcome::Unchanged) {
            self.on_selection_changed();
        }
        outcome
    }

    fn pull_inventory(&self, observed: Option<DateTime<Utc>>) -> PassOutcome {
        let Some(ws) = self.workspace() else {
            return PassOutcome::Skipped(SkipReason::NoWorkspace);
        };
        if !self.online.get() {
            return PassOutcome::Skipped(SkipReason::Offline);
        }
        if self.inventory_is_dirty(&ws) {
            return PassOutcome::Skipped(SkipReason::InventoryDirty);
        }
        let Some(_token) = self.flags.inventory.try_acquire() else {
            return PassOutcome::Skipped(SkipReason::Busy);
        };

        let (doc, _) = match self.read_inventory(&ws) {
            Ok(read) => read,
            Err(e) => return self.fail(&ws, &e),
        };
        if !self.is_current(&ws) {
            return PassOutcome::Superseded;
        }
        let incoming = doc.roles_by_alias();
        self.set_ready(true);

        let (changed, imported) = if self.flags.is_seeded() {
            let previous = self.inventory.borrow().snapshot.clone().unwrap_or_default();
            let changes = diff_roles(&previous, &incoming);
            if !changes.is_empty() {
                log::debug!("Applying {} inventory change(s)", changes.len());
            }
            let mut changed = self.selection.borrow_mut().apply_changes(&changes);
            for change in &changes {
                if let RoleChange::AliasRemoved { alias } = change {
                    changed |= self.forget_removed(&ws, alias);
                }
            }
            (changed, self.import_hosts(&incoming))
        } else {
            self.seed(&incoming)
        };

        {
            let mut inventory = self.inventory.borrow_mut();
            inventory.snapshot = Some(incoming);
            if observed.is_some() {
                inventory.modified_at = observed;
            }
        }
        self.clear_error();
        self.pull_imported(&imported);

        if changed {
            let roles = self.selection.borrow().roles().clone();
            self.observer.roles_changed(&roles);
            PassOutcome::Applied
        } else {
            PassOutcome::Unchanged
        }
    }

    /// Union the inventory into the selection and import its aliases.
    fn seed(&self, inventory: &RolesByAlias) -> (bool, Vec<String>) {
        let mut inventory = inventory.clone();
        for alias in self.repairs.borrow().iter().map(InventoryRepair::departing) {
            inventory.remove_alias(alias);
        }
        let changed = self.selection.borrow_mut().merge_union(&inventory);
        let imported = self.import_hosts(&inventory);
        self.flags.mark_seeded();
        log::debug!("Seeded selection with {} host(s)", inventory.len());
        (changed, imported)
    }

    /// Drop a host someone else removed from the inventory. Its files stay
    /// behind as orphans.
    fn forget_removed(&self, workspace: &str, alias: &str) -> bool {
        log::info!("{alias} was removed from {}", self.config.inventory_path);
        let removed = self.hosts.borrow_mut().remove(alias).is_some();
        self.host_vars_timers
            .borrow_mut()
            .cancel(&(workspace.to_string(), alias.to_string()));
        let mut active = self.active_alias.borrow_mut();
        if active.as_deref() == Some(alias) {
            *active = None;
        }
        removed
    }

    /// Register placeholders for inventory aliases the registry lacks.
    fn import_hosts(&self, inventory: &RolesByAlias) -> Vec<String> {
        let mut hosts = self.hosts.borrow_mut();
        let repairs = self.repairs.borrow();
        inventory
            .aliases()
            .filter(|alias| !repairs.iter().any(|r| r.departing() == *alias))
            .filter(|alias| hosts.import(alias))
            .map(str::to_string)
            .collect()
    }

    fn pull_imported(&self, imported: &[String]) {
        for alias in imported {
            if let Err(e) = self.pull_host_vars(alias) {
                log::warn!("Could not read host vars of {alias}: {e}");
            }
        }
    }

    // ========================================================================
    // Shared helpers
    // ========================================================================

    pub(crate) fn read_inventory(
        &self,
        workspace: &str,
    ) -> Result<(InventoryDocument, Option<String>)> {
        let content = self
            .store
            .read_file(workspace, &self.config.inventory_path)?;
        let doc = match &content {
            Some(content) => inventory::parse_string(content)?,
            None => InventoryDocument::new(),
        };
        Ok((doc, content))
    }

    pub(crate) fn mutation_pending(&self) -> bool {
        !self.queue.borrow().is_empty()
            || self.flags.mutation.is_held()
            || self.flags.delete_in_flight.is_held()
    }

    fn inventory_is_dirty(&self, workspace: &str) -> bool {
        self.editor
            .borrow()
            .is_dirty_at(workspace, &self.config.inventory_path)
    }

    /// Record a failed pass, unless the workspace moved on meanwhile.
    fn fail(&self, workspace: &str, error: &Error) -> PassOutcome {
        if !self.is_current(workspace) {
            return PassOutcome::Superseded;
        }
        let message = error.to_string();
        log::warn!("Inventory sync failed: {message}");
        self.set_error(Some(message.clone()));
        PassOutcome::Failed(message)
    }

    fn set_error(&self, message: Option<String>) {
        let changed = {
            let mut inventory = self.inventory.borrow_mut();
            let changed = inventory.error != message;
            inventory.error.clone_from(&message);
            changed
        };
        if changed {
            self.observer.sync_error(message.as_deref());
        }
    }

    fn clear_error(&self) {
        self.set_error(None);
    }

    fn set_ready(&self, ready: bool) {
        let changed = self.inventory.borrow().ready != ready;
        if changed {
            self.inventory.borrow_mut().ready = ready;
            self.observer.inventory_ready_changed(ready);
        }
    }

    // ========================================================================
    // Listing
    // ========================================================================

    /// Re-read the workspace listing.
    pub fn refresh_listing(&self) -> Result<()> {
        let ws = self.require_workspace()?;
        let entries = self.store.list_files(&ws)?;
        if self.is_current(&ws) {
            *self.listing.borrow_mut() = entries;
        }
        Ok(())
    }

    /// Listing from the last refresh.
    pub fn files(&self) -> Vec<FileEntry> {
        self.listing.borrow().clone()
    }

    // ========================================================================
    // Editor
    // ========================================================================

    /// Load a file into the editor, replacing the open document.
    pub fn open_document(&self, path: &str) -> Result<()> {
        let ws = self.require_workspace()?;
        let path = normalize_path(path)?;
        let content = self.store.read_file(&ws, &path)?.unwrap_or_default();
        self.editor.borrow_mut().open(&ws, &path, content);
        Ok(())
    }

    pub fn edit_document(&self, content: String, now: Instant) {
        self.editor.borrow_mut().edit(content, now);
    }

    pub fn document(&self) -> Option<OpenDocument> {
        self.editor.borrow().document().cloned()
    }

    /// Write the open document now.
    pub fn flush_document(&self) -> Result<()> {
        self.editor.borrow_mut().flush(&*self.store)
    }

    /// Ask to leave the open document.
    pub fn request_navigation(&self, action: NavAction) -> NavDecision {
        self.editor.borrow_mut().request(action)
    }

    pub fn save_and_continue(&self) -> Result<Option<NavAction>> {
        self.editor.borrow_mut().save_and_continue(&*self.store)
    }

    pub fn cancel_navigation(&self) -> Option<NavAction> {
        self.editor.borrow_mut().cancel()
    }

    pub fn discard_and_continue(&self) -> Option<NavAction> {
        self.editor.borrow_mut().discard()
    }

    // ========================================================================
    // Timers
    // ========================================================================

    /// Fire every due timer: host-vars write-through, then autosave.
    pub fn tick(&self, now: Instant) -> TickReport {
        let mut report = TickReport::default();

        let due = self.host_vars_timers.borrow_mut().drain_due(now);
        for (ws, alias) in due {
            if !self.is_current(&ws) {
                log::debug!("Dropping host-vars write for {alias}: workspace {ws} is gone");
                continue;
            }
            match self.flush_host_vars(&ws, &alias) {
                Ok(true) => report.host_vars_written.push(alias),
                Ok(false) => {}
                Err(e) => {
                    log::warn!("Host-vars write for {alias} failed: {e}");
                    report.host_vars_failed.push((alias, e.to_string()));
                }
            }
        }

        let saved = self.editor.borrow_mut().tick(now, &*self.store);
        report.document = saved.map(|result| result.map_err(|e| e.to_string()));
        report
    }

    /// Earliest pending timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        let timers = self.host_vars_timers.borrow().next_deadline();
        let editor = self.editor.borrow().next_deadline();
        match (timers, editor) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::memory::{MemoryStore, StoreOp};
    use crate::queue::AliasMutation;
    use std::cell::RefCell as TestCell;

    pub(crate) const WS: &str = "ws";
    pub(crate) const INVENTORY: &str = "inventory.yml";

    pub(crate) fn engine(store: &Rc<MemoryStore>) -> Reconciler {
        Reconciler::new(store.clone(), ReconcileConfig::default())
    }

    pub(crate) fn roles_in(store: &MemoryStore) -> RolesByAlias {
        store
            .content(WS, INVENTORY)
            .map(|c| inventory::parse_string(&c).unwrap().roles_by_alias())
            .unwrap_or_default()
    }

    pub(crate) fn roles(pairs: &[(&str, &[&str])]) -> RolesByAlias {
        RolesByAlias::from_pairs(pairs.iter().map(|(a, r)| (*a, r.iter().copied())))
    }

    /// Records every notification.
    #[derive(Default)]
    pub(crate) struct Recorder {
        pub events: TestCell<Vec<String>>,
    }

    impl SyncObserver for Recorder {
        fn roles_changed(&self, roles: &RolesByAlias) {
            self.events.borrow_mut().push(format!("roles:{}", roles.len()));
        }
        fn inventory_ready_changed(&self, ready: bool) {
            self.events.borrow_mut().push(format!("ready:{ready}"));
        }
        fn sync_error(&self, message: Option<&str>) {
            self.events
                .borrow_mut()
                .push(format!("error:{}", message.is_some()));
        }
        fn mutation_acknowledged(&self, mutation: &AliasMutation, error: Option<&str>) {
            self.events
                .borrow_mut()
                .push(format!("ack:{mutation}:{}", error.is_some()));
        }
    }

    #[test]
    fn test_first_load_unions_and_writes_local_roles() {
        let store = Rc::new(MemoryStore::new().with_file(
            WS,
            INVENTORY,
            "all:\n  hosts:\n    db: {}\n  children:\n    nginx:\n      hosts:\n        web: {}\n",
        ));
        let engine = engine(&store);
        let state = WorkspaceState {
            selection: SelectionStore::from_roles(roles(&[("web", &["nginx", "redis"])])),
            ..WorkspaceState::default()
        };

        assert_eq!(engine.open_workspace(WS, state), PassOutcome::Applied);
        assert_eq!(
            roles_in(&store),
            roles(&[("db", &[]), ("web", &["nginx", "redis"])])
        );
        assert!(engine.inventory_ready());
        assert!(engine.host("db").is_some());
        assert_eq!(store.writes_to(INVENTORY), 1);
    }

    #[test]
    fn test_missing_inventory_is_empty_and_ready() {
        let store = Rc::new(MemoryStore::new());
        let engine = engine(&store);
        assert_eq!(engine.switch_workspace(WS), PassOutcome::Unchanged);
        assert!(engine.inventory_ready());
        assert_eq!(store.count(StoreOp::Write), 0);
    }

    #[test]
    fn test_selection_edits_converge() {
        let store = Rc::new(MemoryStore::new());
        let engine = engine(&store);
        engine.switch_workspace(WS);

        engine.edit_selection(|s| s.select_role("web", "nginx")).unwrap();
        engine.edit_selection(|s| s.select_role("web", "redis")).unwrap();
        engine.edit_selection(|s| s.select_role("db", "postgres")).unwrap();
        engine.edit_selection(|s| s.deselect_role("web", "redis"));

        assert_eq!(&roles_in(&store), engine.selection().roles());
        let writes = store.writes_to(INVENTORY);
        assert_eq!(writes, 4);

        // Nothing left to do: further triggers write nothing
        assert_eq!(engine.on_selection_changed(), PassOutcome::Unchanged);
        assert_eq!(engine.sync_selection_to_inventory(), PassOutcome::Unchanged);
        assert_eq!(engine.poll(), PassOutcome::Unchanged);
        assert_eq!(engine.poll(), PassOutcome::Unchanged);
        assert_eq!(store.writes_to(INVENTORY), writes);
    }

    #[test]
    fn test_own_write_does_not_echo() {
        let store = Rc::new(MemoryStore::new());
        let engine = engine(&store);
        engine.switch_workspace(WS);
        engine.edit_selection(|s| s.select_role("web", "nginx")).unwrap();
        let revision = engine.selection().revision();
        store.clear_log();

        // Poller sees the new mtime; B reads and finds nothing new
        assert_eq!(engine.poll(), PassOutcome::Unchanged);
        assert_eq!(engine.selection().revision(), revision);
        assert_eq!(store.count(StoreOp::Write), 0);
        assert_eq!(store.count(StoreOp::Read), 1);
    }

    #[test]
    fn test_external_edit_applies_diff() {
        let store = Rc::new(MemoryStore::new());
        let engine = engine(&store);
        engine.switch_workspace(WS);
        engine.edit_selection(|s| s.select_role("web", "nginx")).unwrap();
        engine.edit_selection(|s| s.select_role("web", "redis")).unwrap();

        store.insert(
            WS,
            INVENTORY,
            "all:\n  children:\n    nginx:\n      hosts:\n        web: {}\n    mysql:\n      hosts:\n        db: {}\n",
        );
        assert_eq!(engine.poll(), PassOutcome::Applied);
        assert_eq!(
            engine.selection().roles(),
            &roles(&[("db", &["mysql"]), ("web", &["nginx"])])
        );
        assert!(engine.host("db").is_some());
    }

    #[test]
    fn test_alias_removed_externally_is_forgotten() {
        let store = Rc::new(MemoryStore::new());
        let engine = engine(&store);
        engine.switch_workspace(WS);
        engine.edit_selection(|s| s.select_role("web", "nginx")).unwrap();
        engine.edit_selection(|s| s.select_role("db", "postgres")).unwrap();
        store.clear_log();

        store.insert(
            WS,
            INVENTORY,
            "all:\n  children:\n    postgres:\n      hosts:\n        db: {}\n",
        );
        assert_eq!(engine.poll(), PassOutcome::Applied);
        assert_eq!(engine.selection().roles(), &roles(&[("db", &["postgres"])]));
        assert!(engine.host("web").is_none());

        // Nothing to write back
        assert_eq!(engine.sync_selection_to_inventory(), PassOutcome::Unchanged);
        assert_eq!(roles_in(&store), roles(&[("db", &["postgres"])]));
        assert_eq!(store.writes_to(INVENTORY), 0);
    }

    #[test]
    fn test_skips_while_offline_then_catches_up() {
        let store = Rc::new(MemoryStore::new());
        let engine = engine(&store);
        engine.switch_workspace(WS);
        engine.set_connectivity(false);

        engine.edit_selection(|s| s.select_role("web", "nginx")).unwrap();
        assert_eq!(store.count(StoreOp::Write), 0);
        assert_eq!(
            engine.sync_selection_to_inventory(),
            PassOutcome::Skipped(SkipReason::Offline)
        );

        assert_eq!(engine.set_connectivity(true), PassOutcome::Applied);
        assert_eq!(roles_in(&store), roles(&[("web", &["nginx"])]));
    }

    #[test]
    fn test_dirty_inventory_buffer_blocks_both_directions() {
        let store = Rc::new(MemoryStore::new().with_file(WS, INVENTORY, "all: {}\n"));
        let engine = engine(&store);
        engine.switch_workspace(WS);
        engine.open_document(INVENTORY).unwrap();
        engine.edit_document("all:\n  hosts:\n    x: {}\n".into(), Instant::now());

        engine.edit_selection(|s| s.select_role("web", "nginx")).unwrap();
        assert_eq!(
            engine.sync_selection_to_inventory(),
            PassOutcome::Skipped(SkipReason::InventoryDirty)
        );
        assert_eq!(
            engine.sync_inventory_to_selection(),
            PassOutcome::Skipped(SkipReason::InventoryDirty)
        );

        engine.flush_document().unwrap();
        assert_eq!(engine.poll(), PassOutcome::Applied);
        let inventory = roles_in(&store);
        assert!(inventory.contains_alias("x"));
        assert!(inventory.contains_alias("web"));
    }

    #[test]
    fn test_read_failure_sets_and_clears_error() {
        let store = Rc::new(MemoryStore::new());
        let recorder = Rc::new(Recorder::default());
        let engine = engine(&store).with_observer(recorder.clone());
        store.fail_next(StoreOp::Read, INVENTORY);

        assert!(matches!(engine.switch_workspace(WS), PassOutcome::Failed(_)));
        assert!(engine.sync_error().is_some());
        assert!(!engine.inventory_ready());

        assert_eq!(engine.sync_inventory_to_selection(), PassOutcome::Unchanged);
        assert_eq!(engine.sync_error(), None);
        let events = recorder.events.borrow();
        assert!(events.contains(&"error:true".to_string()));
        assert!(events.contains(&"ready:true".to_string()));
        assert_eq!(events.last().map(String::as_str), Some("error:false"));
    }

    #[test]
    fn test_parse_failure_is_reported() {
        let store = Rc::new(MemoryStore::new().with_file(WS, INVENTORY, "- a\n- b\n"));
        let engine = engine(&store);
        assert!(matches!(engine.switch_workspace(WS), PassOutcome::Failed(_)));
        assert_eq!(store.count(StoreOp::Write), 0);
    }

    #[test]
    fn test_two_sessions_last_write_wins() {
        let store = Rc::new(MemoryStore::new());
        let first = engine(&store);
        let second = engine(&store);
        first.switch_workspace(WS);
        second.switch_workspace(WS);

        first.edit_selection(|s| s.select_role("web", "nginx")).unwrap();
        second.edit_selection(|s| s.select_role("web", "redis")).unwrap();
        assert_eq!(roles_in(&store), roles(&[("web", &["redis"])]));

        first.poll();
        assert_eq!(first.selection().roles(), &roles(&[("web", &["redis"])]));
        assert_eq!(first.selection().roles(), second.selection().roles());
    }

    #[test]
    fn test_reentrant_trigger_is_dropped() {
        struct Reentrant {
            engine: TestCell<Option<Rc<Reconciler>>>,
            outcomes: TestCell<Vec<PassOutcome>>,
        }
        impl SyncObserver for Reentrant {
            fn roles_changed(&self, _roles: &RolesByAlias) {
                if let Some(engine) = self.engine.borrow().as_ref() {
                    self.outcomes
                        .borrow_mut()
                        .push(engine.sync_inventory_to_selection());
                }
            }
            fn inventory_ready_changed(&self, _ready: bool) {}
            fn sync_error(&self, _message: Option<&str>) {}
            fn mutation_acknowledged(&self, _m: &AliasMutation, _e: Option<&str>) {}
        }

        let store = Rc::new(MemoryStore::new());
        let observer = Rc::new(Reentrant {
            engine: TestCell::new(None),
            outcomes: TestCell::new(Vec::new()),
        });
        let engine = Rc::new(engine(&store).with_observer(observer.clone()));
        *observer.engine.borrow_mut() = Some(engine.clone());

        engine.switch_workspace(WS);
        engine.edit_selection(|s| s.select_role("web", "nginx")).unwrap();
        assert_eq!(
            observer.outcomes.borrow().as_slice(),
            &[PassOutcome::Skipped(SkipReason::Busy)]
        );
        assert_eq!(store.writes_to(INVENTORY), 1);
        *observer.engine.borrow_mut() = None;
    }

    #[test]
    fn test_workspace_switch_resets_state() {
        let store = Rc::new(
            MemoryStore::new()
                .with_file("a", INVENTORY, "all:\n  hosts:\n    web: {}\n")
                .with_file("b", INVENTORY, "all:\n  hosts:\n    db: {}\n"),
        );
        let engine = engine(&store);
        engine.switch_workspace("a");
        assert!(engine.selection().contains_alias("web"));

        engine.switch_workspace("b");
        assert!(!engine.selection().contains_alias("web"));
        assert!(engine.selection().contains_alias("db"));
        assert!(engine.host("web").is_none());
        assert_eq!(store.count(StoreOp::Write), 0);
    }

    #[test]
    fn test_switch_waits_for_unsaved_document() {
        let store = Rc::new(
            MemoryStore::new()
                .with_file(WS, "host_vars/web.yml", "a: 1\n")
                .with_file("other", INVENTORY, "all:\n  hosts:\n    db: {}\n"),
        );
        let engine = engine(&store);
        engine.switch_workspace(WS);
        engine.open_document("host_vars/web.yml").unwrap();
        engine.edit_document("a: 2\n".into(), Instant::now());

        assert_eq!(
            engine.switch_workspace("other"),
            PassOutcome::Skipped(SkipReason::UnsavedDocument)
        );
        assert_eq!(engine.workspace().as_deref(), Some(WS));
        assert_eq!(engine.document().unwrap().content, "a: 2\n");

        let action = engine.save_and_continue().unwrap();
        assert_eq!(action, Some(NavAction::SwitchWorkspace("other".into())));
        assert_eq!(store.content(WS, "host_vars/web.yml").as_deref(), Some("a: 2\n"));

        assert_eq!(engine.switch_workspace("other"), PassOutcome::Applied);
        assert_eq!(engine.workspace().as_deref(), Some("other"));
        assert!(engine.document().is_none());
        assert!(engine.selection().contains_alias("db"));
    }

    #[test]
    fn test_discarded_edits_let_switch_through() {
        let store = Rc::new(MemoryStore::new().with_file(WS, "host_vars/web.yml", "a: 1\n"));
        let engine = engine(&store);
        engine.switch_workspace(WS);
        engine.open_document("host_vars/web.yml").unwrap();
        engine.edit_document("a: 2\n".into(), Instant::now());

        engine.switch_workspace("other");
        assert_eq!(
            engine.discard_and_continue(),
            Some(NavAction::SwitchWorkspace("other".into()))
        );
        assert_eq!(engine.switch_workspace("other"), PassOutcome::Unchanged);
        assert_eq!(store.content(WS, "host_vars/web.yml").as_deref(), Some("a: 1\n"));
    }

    #[test]
    fn test_switch_inside_pass_keeps_guard_held() {
        struct Switcher {
            engine: TestCell<Option<Rc<Reconciler>>>,
            outcome: TestCell<Option<PassOutcome>>,
        }
        impl SyncObserver for Switcher {
            fn roles_changed(&self, _roles: &RolesByAlias) {
                if let Some(engine) = self.engine.borrow_mut().take() {
                    let outcome = engine.switch_workspace("b");
                    assert!(engine.flags.inventory.is_held());
                    *self.outcome.borrow_mut() = Some(outcome);
                }
            }
            fn inventory_ready_changed(&self, _ready: bool) {}
            fn sync_error(&self, _message: Option<&str>) {}
            fn mutation_acknowledged(&self, _m: &AliasMutation, _e: Option<&str>) {}
        }

        let store = Rc::new(MemoryStore::new().with_file("b", INVENTORY, "all:\n  hosts:\n    db: {}\n"));
        let observer = Rc::new(Switcher {
            engine: TestCell::new(None),
            outcome: TestCell::new(None),
        });
        let engine = Rc::new(engine(&store).with_observer(observer.clone()));
        engine.switch_workspace("a");
        *observer.engine.borrow_mut() = Some(engine.clone());

        engine.edit_selection(|s| s.select_role("web", "nginx")).unwrap();
        assert_eq!(
            *observer.outcome.borrow(),
            Some(PassOutcome::Skipped(SkipReason::Busy))
        );
        assert!(!engine.flags.inventory.is_held());
        assert_eq!(engine.workspace().as_deref(), Some("b"));

        // The dropped trigger runs again on the next call
        assert_eq!(engine.sync_inventory_to_selection(), PassOutcome::Applied);
        assert!(engine.selection().contains_alias("db"));
    }

    #[test]
    fn test_restored_state_applies_offline_changes() {
        let store = Rc::new(MemoryStore::new());
        let engine = engine(&store);
        engine.switch_workspace(WS);
        engine.edit_selection(|s| s.select_role("web", "nginx")).unwrap();
        let saved = engine.export_state();

        // Someone drops the role while this session is closed
        store.insert(WS, INVENTORY, "all:\n  hosts:\n    web: {}\n");
        let engine = self::engine(&store);
        assert_eq!(engine.open_workspace(WS, saved), PassOutcome::Applied);
        assert_eq!(engine.selection().roles(), &roles(&[("web", &[])]));
    }

    #[test]
    fn test_workspace_state_skips_secrets() {
        let mut state = WorkspaceState::default();
        let mut host = HostRecord::new("web", "10.0.0.1", "root");
        host.password = Some("hunter2".into());
        state.hosts.add(host).unwrap();
        let json = serde_json::to_string(&state).unwrap();
        assert!(!json.contains("hunter2"));
        let back: WorkspaceState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.hosts.get("web").unwrap().password, None);
    }
}
