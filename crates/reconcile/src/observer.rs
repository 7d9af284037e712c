//! Notifications for collaborators of the engine.
//!
//! Callbacks run on the engine's thread while the pass that produced them
//! is still guarded, so an observer may call back into the engine; any
//! overlapping trigger it fires is dropped.

use crate::queue::AliasMutation;
use inventory::RolesByAlias;

/// Receiver of engine state changes.
pub trait SyncObserver {
    /// The canonical `alias -> roles` mapping was written or applied.
    fn roles_changed(&self, roles: &RolesByAlias);

    /// The inventory became readable (or confirmed absent), or was lost.
    fn inventory_ready_changed(&self, ready: bool);

    /// The last sync error changed. `None` clears it.
    fn sync_error(&self, message: Option<&str>);

    /// A queued mutation finished and was removed from the queue.
    fn mutation_acknowledged(&self, mutation: &AliasMutation, error: Option<&str>);
}

/// Observer that ignores everything.
pub struct NoObserver;

impl SyncObserver for NoObserver {
    fn roles_changed(&self, _roles: &RolesByAlias) {}
    fn inventory_ready_changed(&self, _ready: bool) {}
    fn sync_error(&self, _message: Option<&str>) {}
    fn mutation_acknowledged(&self, _mutation: &AliasMutation, _error: Option<&str>) {}
}

/// Observer that logs every notification.
pub struct LogObserver;

impl SyncObserver for LogObserver {
    fn roles_changed(&self, roles: &RolesByAlias) {
        log::debug!("Roles changed: {} host(s)", roles.len());
    }

    fn inventory_ready_changed(&self, ready: bool) {
        log::debug!("Inventory ready: {ready}");
    }

    fn sync_error(&self, message: Option<&str>) {
        if let Some(message) = message {
            log::warn!("Inventory sync failed: {message}");
        }
    }

    fn mutation_acknowledged(&self, mutation: &AliasMutation, error: Option<&str>) {
        match error {
            Some(error) => log::warn!("{mutation} finished with errors: {error}"),
            None => log::info!("{mutation} done"),
        }
    }
}
