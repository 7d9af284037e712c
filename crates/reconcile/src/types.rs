//! Engine configuration and pass outcomes.

use inventory::INVENTORY_FILENAME;
use std::time::Duration;

/// Default host-vars write-through delay.
pub const HOST_VARS_DEBOUNCE: Duration = Duration::from_millis(1400);

/// Default autosave delay.
pub const AUTOSAVE_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Workspace-relative inventory path
    pub inventory_path: String,
    /// Delay between the last host edit and its host-vars write
    pub host_vars_debounce: Duration,
    /// Delay between the last document edit and its autosave
    pub autosave_debounce: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            inventory_path: INVENTORY_FILENAME.to_string(),
            host_vars_debounce: HOST_VARS_DEBOUNCE,
            autosave_debounce: AUTOSAVE_DEBOUNCE,
        }
    }
}

impl ReconcileConfig {
    pub fn with_inventory_path(mut self, path: impl Into<String>) -> Self {
        self.inventory_path = path.into();
        self
    }

    pub fn with_host_vars_debounce(mut self, delay: Duration) -> Self {
        self.host_vars_debounce = delay;
        self
    }

    pub fn with_autosave_debounce(mut self, delay: Duration) -> Self {
        self.autosave_debounce = delay;
        self
    }
}

/// What a direction pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Inventory or selection was updated
    Applied,
    /// Nothing differed
    Unchanged,
    /// Preconditions not met or guard held
    Skipped(SkipReason),
    /// Workspace changed while the pass was running
    Superseded,
    /// I/O or parse failure, recorded as the sync error
    Failed(String),
}

impl PassOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Why a pass did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No workspace selected
    NoWorkspace,
    /// Connectivity not ready
    Offline,
    /// Another pass holds the guard
    Busy,
    /// Alias mutations are queued or running
    MutationPending,
    /// The inventory is open in the editor with unsaved changes
    InventoryDirty,
    /// Inventory has not been read yet
    NotReady,
    /// The open document has unsaved edits; the switch waits for a save,
    /// cancel or discard
    UnsavedDocument,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::NoWorkspace => "no workspace selected",
            Self::Offline => "offline",
            Self::Busy => "another sync is running",
            Self::MutationPending => "alias changes pending",
            Self::InventoryDirty => "inventory has unsaved edits",
            Self::NotReady => "inventory not loaded",
            Self::UnsavedDocument => "open document has unsaved edits",
        };
        f.write_str(reason)
    }
}
