//! One command's view of a workspace: config, store, saved state and engine.

use crate::Context;
use crate::config::Config;
use crate::state::SyncState;
use crate::ui;
use anyhow::{Context as _, Result};
use reconcile::{FileStore, LogObserver, PassOutcome, Reconciler, SkipReason, TickReport};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;

pub struct Session {
    pub config: Config,
    pub workspace: String,
    pub engine: Reconciler,
    /// Outcome of the pull that ran when the workspace was opened
    pub opened: PassOutcome,
    store: Rc<dyn FileStore>,
    state: SyncState,
    state_path: PathBuf,
}

impl Session {
    /// Open the workspace named on the command line or in the config.
    pub fn open(ctx: &Context) -> Result<Self> {
        Self::open_connected(ctx, !ctx.offline)
    }

    /// Open without writing anything to the store.
    pub fn open_offline(ctx: &Context) -> Result<Self> {
        Self::open_connected(ctx, false)
    }

    fn open_connected(ctx: &Context, online: bool) -> Result<Self> {
        let config = Config::load()?;
        let workspace = config.resolve_workspace(ctx.workspace.as_deref())?;
        let store = config.store()?;
        Self::open_with(config, store, workspace, !online, SyncState::path()?)
    }

    pub fn open_with(
        config: Config,
        store: Rc<dyn FileStore>,
        workspace: String,
        offline: bool,
        state_path: PathBuf,
    ) -> Result<Self> {
        let state = SyncState::load_from(&state_path)?;
        let engine = Reconciler::new(store.clone(), config.reconcile_config())
            .with_observer(Rc::new(LogObserver));
        if offline {
            engine.set_connectivity(false);
        }

        log::debug!("Opening workspace {workspace}");
        let opened = engine.open_workspace(&workspace, state.workspace(&workspace));
        Ok(Self {
            config,
            workspace,
            engine,
            opened,
            store,
            state,
            state_path,
        })
    }

    pub fn store(&self) -> &dyn FileStore {
        &*self.store
    }

    pub fn inventory_path(&self) -> &str {
        &self.config.sync.inventory_path
    }

    /// Fire every pending timer now instead of waiting out the debounce.
    pub fn settle(&self) -> TickReport {
        let config = self.engine.config();
        let horizon = config.host_vars_debounce.max(config.autosave_debounce);
        let report = self.engine.tick(Instant::now() + horizon);
        for alias in &report.host_vars_written {
            log::info!("Wrote host vars for {alias}");
        }
        for (alias, error) in &report.host_vars_failed {
            ui::warn(&format!("Host vars for {alias} not written: {error}"));
        }
        report
    }

    /// Persist the engine state of this workspace.
    pub fn save(&mut self) -> Result<()> {
        let synced = self.engine.is_online() && self.engine.sync_error().is_none();
        self.state
            .record(&self.workspace, self.engine.export_state(), synced);
        self.state
            .save_to(&self.state_path)
            .context("Failed to save sync state")
    }

    /// Settle timers, warn about a pending sync error and save.
    pub fn finish(mut self) -> Result<()> {
        self.settle();
        if let Some(error) = self.engine.sync_error() {
            ui::warn(&format!("Inventory not in sync: {error}"));
        }
        self.save()
    }

    pub fn last_sync(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.state.last_sync(&self.workspace)
    }
}

/// Human summary of a pass outcome, `None` when there is nothing to say.
pub fn describe(outcome: &PassOutcome) -> Option<String> {
    match outcome {
        PassOutcome::Applied => Some("Inventory and selection reconciled".to_string()),
        PassOutcome::Unchanged => None,
        PassOutcome::Skipped(SkipReason::Offline) => {
            Some("Offline: changes will be written on the next online run".to_string())
        }
        PassOutcome::Skipped(reason) => Some(format!("Sync skipped: {reason}")),
        PassOutcome::Superseded => Some("Sync superseded by a workspace switch".to_string()),
        PassOutcome::Failed(error) => Some(format!("Sync failed: {error}")),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use reconcile::MemoryStore;
    use tempfile::TempDir;

    pub(crate) const WS: &str = "prod";

    pub(crate) fn session(store: &Rc<MemoryStore>, dir: &TempDir) -> Session {
        Session::open_with(
            Config::default(),
            store.clone(),
            WS.to_string(),
            false,
            dir.path().join("state.toml"),
        )
        .unwrap()
    }

    #[test]
    fn test_state_survives_sessions() {
        let dir = TempDir::new().unwrap();
        let store = Rc::new(MemoryStore::new());

        let first = session(&store, &dir);
        first
            .engine
            .edit_selection(|s| s.select_role("web", "nginx"))
            .unwrap();
        first.finish().unwrap();

        let second = session(&store, &dir);
        assert_eq!(second.opened, PassOutcome::Unchanged);
        assert!(second.engine.selection().roles().contains_alias("web"));
        assert!(second.last_sync().is_some());
    }

    #[test]
    fn test_offline_session_defers_writes() {
        let dir = TempDir::new().unwrap();
        let store = Rc::new(MemoryStore::new());

        let offline = Session::open_with(
            Config::default(),
            store.clone(),
            WS.to_string(),
            true,
            dir.path().join("state.toml"),
        )
        .unwrap();
        offline
            .engine
            .edit_selection(|s| s.select_role("web", "nginx"))
            .unwrap();
        offline.finish().unwrap();
        assert!(store.content(WS, "inventory.yml").is_none());

        // Opening online pulls an empty inventory, then writes the offline edit
        let online = session(&store, &dir);
        assert_eq!(online.opened, PassOutcome::Unchanged);
        assert!(store.content(WS, "inventory.yml").unwrap().contains("nginx"));
        assert_eq!(online.engine.on_selection_changed(), PassOutcome::Unchanged);
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(&PassOutcome::Unchanged), None);
        assert!(describe(&PassOutcome::Failed("boom".into())).unwrap().contains("boom"));
    }
}
