use crate::paths;
use anyhow::{Context, Result, bail};
use reconcile::{FileStore, HttpStore, LocalStore, ReconcileConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

/// Config file name inside the config directory
pub const CONFIG_FILENAME: &str = "config.toml";

/// Default environment variable holding the API token
pub const DEFAULT_TOKEN_ENV: &str = "HOSTSYNC_TOKEN";

const DEBOUNCE_RANGE_MS: std::ops::RangeInclusive<u64> = 100..=60_000;
const POLL_RANGE_MS: std::ops::RangeInclusive<u64> = 250..=3_600_000;

// ============================================================================
// Config Schema
// ============================================================================

/// The hostsync configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Where workspace files live
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Workspace selection
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Sync timing and paths
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Which file store backs the workspaces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Http,
    #[default]
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub backend: Backend,

    /// Base URL of the workspace files API (http backend)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Environment variable holding the bearer token (http backend)
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Directory holding one subdirectory per workspace (local backend)
    #[serde(default = "default_root")]
    pub root: String,
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

fn default_root() -> String {
    "~/hostsync".to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            base_url: None,
            token_env: default_token_env(),
            root: default_root(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Workspace used when none is given on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub inventory_path: String,
    pub host_vars_debounce_ms: u64,
    pub autosave_debounce_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            inventory_path: inventory::INVENTORY_FILENAME.to_string(),
            host_vars_debounce_ms: 1400,
            autosave_debounce_ms: 1000,
            poll_interval_ms: 2000,
        }
    }
}

// ============================================================================
// Loading and Saving
// ============================================================================

impl Config {
    /// Path of the config file
    pub fn path() -> Result<PathBuf> {
        Ok(paths::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Load the config, or defaults if the file doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }
        let content = self.to_toml()?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.remote.backend {
            Backend::Http => {
                let Some(url) = &self.remote.base_url else {
                    bail!("remote.base_url is required for the http backend");
                };
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    bail!("remote.base_url must start with http:// or https://, got '{url}'");
                }
            }
            Backend::Local => {
                if self.remote.root.trim().is_empty() {
                    bail!("remote.root must not be empty");
                }
            }
        }

        reconcile::normalize_path(&self.sync.inventory_path)
            .context("sync.inventory_path is not a valid workspace path")?;

        for (name, value) in [
            ("sync.host_vars_debounce_ms", self.sync.host_vars_debounce_ms),
            ("sync.autosave_debounce_ms", self.sync.autosave_debounce_ms),
        ] {
            if !DEBOUNCE_RANGE_MS.contains(&value) {
                bail!(
                    "{name} must be between {} and {} (got {value})",
                    DEBOUNCE_RANGE_MS.start(),
                    DEBOUNCE_RANGE_MS.end()
                );
            }
        }
        if !POLL_RANGE_MS.contains(&self.sync.poll_interval_ms) {
            bail!(
                "sync.poll_interval_ms must be between {} and {} (got {})",
                POLL_RANGE_MS.start(),
                POLL_RANGE_MS.end(),
                self.sync.poll_interval_ms
            );
        }
        Ok(())
    }

    // ========================================================================
    // Derived Settings
    // ========================================================================

    pub fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig::default()
            .with_inventory_path(self.sync.inventory_path.clone())
            .with_host_vars_debounce(Duration::from_millis(self.sync.host_vars_debounce_ms))
            .with_autosave_debounce(Duration::from_millis(self.sync.autosave_debounce_ms))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.sync.poll_interval_ms)
    }

    /// Build the configured file store
    pub fn store(&self) -> Result<Rc<dyn FileStore>> {
        match self.remote.backend {
            Backend::Http => {
                let url = self
                    .remote
                    .base_url
                    .as_deref()
                    .context("remote.base_url is required for the http backend")?;
                let mut store = HttpStore::new(url);
                match std::env::var(&self.remote.token_env) {
                    Ok(token) if !token.is_empty() => store = store.with_token(token),
                    _ => log::debug!("{} not set, calling the API anonymously", self.remote.token_env),
                }
                Ok(Rc::new(store))
            }
            Backend::Local => {
                let root = paths::expand(&self.remote.root);
                log::debug!("Using local workspaces under {}", root.display());
                Ok(Rc::new(LocalStore::new(root)))
            }
        }
    }

    /// Workspace from the command line, else the configured default
    pub fn resolve_workspace(&self, requested: Option<&str>) -> Result<String> {
        requested
            .map(str::to_string)
            .or_else(|| self.workspace.default.clone())
            .context("No workspace given: pass --workspace or set workspace.default in the config")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join(CONFIG_FILENAME)).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.sync.host_vars_debounce_ms, 1400);
        assert_eq!(config.remote.backend, Backend::Local);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(
            &path,
            "[remote]\nbackend = \"http\"\nbase_url = \"https://api.example.com\"\n\n[workspace]\ndefault = \"prod\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.remote.backend, Backend::Http);
        assert_eq!(config.remote.token_env, DEFAULT_TOKEN_ENV);
        assert_eq!(config.sync.poll_interval_ms, 2000);
        assert_eq!(config.resolve_workspace(None).unwrap(), "prod");
        assert_eq!(config.resolve_workspace(Some("dev")).unwrap(), "dev");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILENAME);
        let mut config = Config::default();
        config.workspace.default = Some("lab".into());
        config.sync.poll_interval_ms = 5000;

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.remote.backend = Backend::Http;
        assert!(config.validate().is_err());

        config.remote.base_url = Some("ftp://nope".into());
        assert!(config.validate().is_err());

        config.remote.base_url = Some("http://localhost:8000".into());
        assert!(config.validate().is_ok());

        config.sync.host_vars_debounce_ms = 5;
        assert!(config.validate().is_err());

        config.sync.host_vars_debounce_ms = 1400;
        config.sync.inventory_path = "../inventory.yml".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_no_workspace_is_an_error() {
        assert!(Config::default().resolve_workspace(None).is_err());
    }

    #[test]
    fn test_reconcile_config() {
        let mut config = Config::default();
        config.sync.inventory_path = "ansible/inventory.yml".into();
        let engine = config.reconcile_config();
        assert_eq!(engine.inventory_path, "ansible/inventory.yml");
        assert_eq!(engine.host_vars_debounce, Duration::from_millis(1400));
    }
}
