//! # inventory
//!
//! Pure codecs for the documents a provisioning workspace keys by host alias.
//!
//! This crate provides:
//! - Parsing and writing Ansible-style YAML inventories as `alias -> roles`
//! - Parsing host-vars documents and computing minimal field patches
//! - Alias and host field validation, file-name sanitization
//! - Workspace-relative paths of every per-alias file
//!
//! Nothing here performs I/O; callers read and write documents themselves.
//!
//! ## Example
//!
//! ```
//! use inventory::{InventoryDocument, RolesByAlias};
//!
//! let doc = inventory::parse_string("all:\n  children:\n    nginx:\n      hosts:\n        web: {}\n").unwrap();
//! let mut roles = doc.roles_by_alias();
//! roles.add_role("web", "redis");
//!
//! let yaml = InventoryDocument::from_roles(&roles).to_yaml().unwrap();
//! assert!(yaml.contains("redis"));
//! ```

pub mod alias;
pub mod error;
pub mod host_vars;
pub mod inventory;
pub mod paths;
pub mod types;

pub use alias::{is_valid_alias, normalize_role_id, sanitize_filename, validate_alias};
pub use error::{Error, ErrorCategory, Result};
pub use host_vars::{
    FieldChange, HostVars, HostVarsDocument, HostVarsField, HostVarsPatch, validate_color,
    validate_logo, validate_port, validate_required,
};
pub use inventory::{InventoryDocument, parse_string, write_string};
pub use paths::{AliasFileKind, AliasPaths, INVENTORY_FILENAME};
pub use types::{RoleChange, RolesByAlias, diff_roles};
