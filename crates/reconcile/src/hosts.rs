//! Host records keyed by alias.

use crate::error::{Error, Result};
use inventory::{
    HostVars, validate_alias, validate_color, validate_logo, validate_port, validate_required,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// How the engine authenticates against a host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    #[default]
    Password,
    PrivateKey,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Password => write!(f, "password"),
            AuthMethod::PrivateKey => write!(f, "private_key"),
        }
    }
}

/// A managed host.
///
/// Secrets are held in memory only; they are never written to host vars
/// or persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    pub alias: String,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub auth: AuthMethod,
    #[serde(skip)]
    pub password: Option<String>,
    #[serde(skip)]
    pub private_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_domain: Option<String>,

    // Requirement hints, never mirrored into host vars
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_gb: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

impl HostRecord {
    /// A record with connection fields and defaults for the rest.
    pub fn new(alias: impl Into<String>, host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            ..Self::placeholder(alias)
        }
    }

    /// A record known only by alias, e.g. imported from the inventory.
    pub fn placeholder(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            host: String::new(),
            port: DEFAULT_PORT,
            user: String::new(),
            auth: AuthMethod::default(),
            password: None,
            private_key: None,
            color: None,
            logo: None,
            description: None,
            primary_domain: None,
            server_type: None,
            storage_gb: None,
            location: None,
        }
    }

    /// Check every field of a host being added.
    pub fn validate(&self) -> Result<()> {
        self.validate_fields()?;
        let secret = match self.auth {
            AuthMethod::Password => self.password.as_deref(),
            AuthMethod::PrivateKey => self.private_key.as_deref(),
        };
        if secret.is_none_or(|s| s.trim().is_empty()) {
            return Err(inventory::Error::InvalidField {
                field: "secret",
                message: format!("{} auth needs a secret", self.auth),
            }
            .into());
        }
        Ok(())
    }

    /// Check connection and display fields, ignoring secrets.
    pub fn validate_fields(&self) -> Result<()> {
        validate_alias(&self.alias)?;
        validate_required("host", &self.host)?;
        validate_required("user", &self.user)?;
        validate_port(self.port)?;
        if let Some(color) = &self.color {
            validate_color(color)?;
        }
        if let Some(logo) = &self.logo {
            validate_logo(logo)?;
        }
        Ok(())
    }

    /// Fields mirrored into the host-vars document.
    pub fn host_vars(&self) -> HostVars {
        let text = |s: &str| Some(s.trim().to_string()).filter(|s| !s.is_empty());
        HostVars {
            host: text(&self.host),
            port: Some(self.port),
            user: text(&self.user),
            description: self.description.as_deref().and_then(text),
            primary_domain: self.primary_domain.as_deref().and_then(text),
            color: self.color.as_deref().and_then(text),
            logo_emoji: self.logo.as_deref().and_then(text),
        }
    }

    /// Take over the mirrored fields from a host-vars document.
    ///
    /// Returns true if anything changed.
    pub fn absorb_host_vars(&mut self, vars: &HostVars) -> bool {
        let before = self.clone();
        if let Some(host) = &vars.host {
            self.host.clone_from(host);
        }
        if let Some(port) = vars.port {
            self.port = port;
        }
        if let Some(user) = &vars.user {
            self.user.clone_from(user);
        }
        self.description.clone_from(&vars.description);
        self.primary_domain.clone_from(&vars.primary_domain);
        self.color.clone_from(&vars.color);
        self.logo.clone_from(&vars.logo_emoji);
        *self != before
    }
}

/// All host records of a workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostRegistry {
    hosts: BTreeMap<String, HostRecord>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validated host. Fails on duplicates.
    pub fn add(&mut self, record: HostRecord) -> Result<()> {
        record.validate()?;
        if self.hosts.contains_key(&record.alias) {
            return Err(Error::DuplicateAlias(record.alias));
        }
        self.hosts.insert(record.alias.clone(), record);
        Ok(())
    }

    /// Insert a placeholder for an alias seen elsewhere. Returns true if new.
    pub fn import(&mut self, alias: &str) -> bool {
        if self.hosts.contains_key(alias) {
            return false;
        }
        log::info!("Imported host '{alias}' from inventory");
        self.hosts
            .insert(alias.to_string(), HostRecord::placeholder(alias));
        true
    }

    pub fn get(&self, alias: &str) -> Option<&HostRecord> {
        self.hosts.get(alias)
    }

    pub fn get_mut(&mut self, alias: &str) -> Option<&mut HostRecord> {
        self.hosts.get_mut(alias)
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.hosts.contains_key(alias)
    }

    pub fn remove(&mut self, alias: &str) -> Option<HostRecord> {
        self.hosts.remove(alias)
    }

    /// Move a record to a new alias. False if `from` is unknown or `to` taken.
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        if self.hosts.contains_key(to) {
            return false;
        }
        let Some(mut record) = self.hosts.remove(from) else {
            return false;
        };
        record.alias = to.to_string();
        self.hosts.insert(to.to_string(), record);
        true
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.hosts.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HostRecord> {
        self.hosts.values()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web() -> HostRecord {
        HostRecord {
            password: Some("hunter2".into()),
            ..HostRecord::new("web", "203.0.113.10", "root")
        }
    }

    #[test]
    fn test_validate_ok() {
        assert!(web().validate().is_ok());
    }

    #[test]
    fn test_validate_rejections() {
        let mut record = web();
        record.port = 0;
        assert!(record.validate().unwrap_err().is_validation());

        let mut record = web();
        record.color = Some("blue".into());
        assert!(record.validate().is_err());

        let mut record = web();
        record.logo = Some(String::new());
        assert!(record.validate().is_err());

        let mut record = web();
        record.auth = AuthMethod::PrivateKey;
        assert!(record.validate().is_err());

        let mut record = web();
        record.alias = "Web".into();
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_add_rejects_duplicate() {
        let mut registry = HostRegistry::new();
        registry.add(web()).unwrap();
        let err = registry.add(web()).unwrap_err();
        assert!(matches!(err, Error::DuplicateAlias(_)));
        assert!(err.is_validation());
    }

    #[test]
    fn test_import_and_rename() {
        let mut registry = HostRegistry::new();
        assert!(registry.import("db"));
        assert!(!registry.import("db"));
        registry.add(web()).unwrap();

        assert!(!registry.rename("web", "db"));
        assert!(registry.rename("web", "edge"));
        assert_eq!(registry.get("edge").unwrap().alias, "edge");
        assert_eq!(registry.aliases().collect::<Vec<_>>(), vec!["db", "edge"]);
    }

    #[test]
    fn test_host_vars_round() {
        let mut record = web();
        record.logo = Some("🚀".into());
        record.description = Some("  ".into());
        let vars = record.host_vars();
        assert_eq!(vars.host.as_deref(), Some("203.0.113.10"));
        assert_eq!(vars.port, Some(22));
        assert_eq!(vars.description, None);

        let mut imported = HostRecord::placeholder("web");
        assert!(imported.absorb_host_vars(&vars));
        assert_eq!(imported.host, "203.0.113.10");
        assert_eq!(imported.logo.as_deref(), Some("🚀"));
        assert!(!imported.absorb_host_vars(&vars));
    }

    #[test]
    fn test_secrets_not_serialized() {
        let json = serde_json::to_string(&web()).unwrap();
        assert!(!json.contains("hunter2"));
        let back: HostRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.password, None);
        assert_eq!(back.port, 22);
    }
}
