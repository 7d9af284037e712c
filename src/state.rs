use crate::paths;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reconcile::WorkspaceState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// State file name inside the state directory
pub const STATE_FILENAME: &str = "state.toml";

// ============================================================================
// State Structures
// ============================================================================

/// Everything hostsync remembers between runs
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncState {
    /// Per-workspace selection, hosts and last seen inventory
    #[serde(default)]
    pub workspaces: BTreeMap<String, WorkspaceRecord>,

    /// Last time the state was updated
    pub last_updated: DateTime<Utc>,
}

/// Saved state of one workspace
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct WorkspaceRecord {
    /// Last time a sync pass completed
    pub last_sync: Option<DateTime<Utc>>,

    #[serde(default)]
    pub engine: WorkspaceState,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            workspaces: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }
}

// ============================================================================
// SyncState Implementation
// ============================================================================

impl SyncState {
    /// Get the state file path
    pub fn path() -> Result<PathBuf> {
        Ok(paths::state_dir()?.join(STATE_FILENAME))
    }

    /// Load state from disk, or return default if file doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using default state");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        let state: SyncState = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded state from {}", path.display());
        Ok(state)
    }

    /// Save state to disk
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }
        let content = toml::to_string_pretty(&self).context("Failed to serialize state to TOML")?;
        fs::write(path, &content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    // ========================================================================
    // Workspace Helpers
    // ========================================================================

    /// Saved engine state of a workspace, empty if never synced
    pub fn workspace(&self, name: &str) -> WorkspaceState {
        self.workspaces
            .get(name)
            .map(|record| record.engine.clone())
            .unwrap_or_default()
    }

    pub fn last_sync(&self, name: &str) -> Option<DateTime<Utc>> {
        self.workspaces.get(name).and_then(|record| record.last_sync)
    }

    /// Store the engine state of a workspace
    pub fn record(&mut self, name: &str, engine: WorkspaceState, synced: bool) {
        let record = self.workspaces.entry(name.to_string()).or_default();
        record.engine = engine;
        if synced {
            record.last_sync = Some(Utc::now());
        }
        self.last_updated = Utc::now();
    }
}

// ============================================================================
// Tests
// ============================================================================
