//! Workspace-relative paths of every document keyed by alias.
//!
//! ```text
//! inventory.yml
//! host_vars/<alias>.yml
//! secrets/ssh_keys/<alias>
//! secrets/ssh_keys/<alias>.pub
//! ```

use crate::alias::sanitize_filename;
use std::fmt;

/// Inventory document path, fixed per workspace.
pub const INVENTORY_FILENAME: &str = "inventory.yml";

/// Directory holding one host-vars document per alias.
pub const HOST_VARS_DIR: &str = "host_vars";

/// Directory holding SSH key material per alias.
pub const SSH_KEYS_DIR: &str = "secrets/ssh_keys";

/// Host-vars path for an alias.
pub fn host_vars_path(alias: &str) -> String {
    format!("{HOST_VARS_DIR}/{}.yml", sanitize_filename(alias))
}

/// Private key path for an alias.
pub fn private_key_path(alias: &str) -> String {
    format!("{SSH_KEYS_DIR}/{}", sanitize_filename(alias))
}

/// Public key path for an alias.
pub fn public_key_path(alias: &str) -> String {
    format!("{SSH_KEYS_DIR}/{}.pub", sanitize_filename(alias))
}

/// Kind of per-alias file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AliasFileKind {
    /// `host_vars/<alias>.yml`
    HostVars,
    /// `secrets/ssh_keys/<alias>`
    PrivateKey,
    /// `secrets/ssh_keys/<alias>.pub`
    PublicKey,
}

impl fmt::Display for AliasFileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::HostVars => "host vars",
            Self::PrivateKey => "private key",
            Self::PublicKey => "public key",
        };
        f.write_str(label)
    }
}

/// All per-alias file paths, in cascade order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasPaths {
    pub host_vars: String,
    pub private_key: String,
    pub public_key: String,
}

impl AliasPaths {
    pub fn for_alias(alias: &str) -> Self {
        Self {
            host_vars: host_vars_path(alias),
            private_key: private_key_path(alias),
            public_key: public_key_path(alias),
        }
    }

    /// Paths paired with their kind.
    pub fn entries(&self) -> [(AliasFileKind, &str); 3] {
        [
            (AliasFileKind::HostVars, self.host_vars.as_str()),
            (AliasFileKind::PrivateKey, self.private_key.as_str()),
            (AliasFileKind::PublicKey, self.public_key.as_str()),
        ]
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries().iter().any(|(_, p)| *p == path)
    }
}

/// Recover the alias embedded in a per-alias file path.
///
/// Returns `None` for anything that is not a host-vars document or an SSH
/// key directly under the keys directory.
pub fn classify(path: &str) -> Option<(String, AliasFileKind)> {
    let path = path.trim_start_matches('/');

    if let Some(name) = path.strip_prefix(HOST_VARS_DIR).and_then(|r| r.strip_prefix('/')) {
        if name.contains('/') {
            return None;
        }
        let stem = name
            .strip_suffix(".yml")
            .or_else(|| name.strip_suffix(".yaml"))?;
        return (!stem.is_empty()).then(|| (stem.to_string(), AliasFileKind::HostVars));
    }

    if let Some(name) = path.strip_prefix(SSH_KEYS_DIR).and_then(|r| r.strip_prefix('/')) {
        if name.is_empty() || name.contains('/') || name.starts_with('.') {
            return None;
        }
        return match name.strip_suffix(".pub") {
            Some(stem) if !stem.is_empty() => {
                Some((stem.to_string(), AliasFileKind::PublicKey))
            }
            Some(_) => None,
            None => Some((name.to_string(), AliasFileKind::PrivateKey)),
        };
    }

    None
}
