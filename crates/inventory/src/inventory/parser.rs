//! Parser for Ansible YAML inventories.
//!
//! ```text
//! all:
//!   hosts:
//!     web: {}
//!   children:
//!     nginx:
//!       hosts:
//!         web: {}
//! ```

use super::{ALL, CHILDREN, HOSTS, InventoryDocument};
use crate::error::{Error, Result};
use serde_yaml::{Mapping, Value};

/// Parse an inventory from a string.
///
/// Blank content is an empty inventory. The root, `all`, `all.children`
/// and every group must be mappings; `hosts` may be a mapping or null.
pub fn parse_string(content: &str) -> Result<InventoryDocument> {
    if content.trim().is_empty() {
        return Ok(InventoryDocument::new());
    }

    let value: Value = serde_yaml::from_str(content)?;
    let root = match value {
        Value::Null => Mapping::new(),
        Value::Mapping(mapping) => mapping,
        _ => return Err(shape_error("root must be a mapping")),
    };

    if let Some(all) = root.get(ALL) {
        validate_all(all)?;
    }

    Ok(InventoryDocument { root })
}

fn validate_all(all: &Value) -> Result<()> {
    let all = match all {
        Value::Null => return Ok(()),
        Value::Mapping(all) => all,
        _ => return Err(shape_error("'all' must be a mapping")),
    };

    if let Some(hosts) = all.get(HOSTS) {
        validate_hosts(hosts, "all.hosts")?;
    }

    match all.get(CHILDREN) {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Mapping(children)) => {
            for (name, group) in children {
                let name = name
                    .as_str()
                    .ok_or_else(|| shape_error("group names must be strings"))?;
                match group {
                    Value::Null => {}
                    Value::Mapping(group) => {
                        if let Some(hosts) = group.get(HOSTS) {
                            validate_hosts(hosts, &format!("all.children.{name}.hosts"))?;
                        }
                    }
                    _ => {
                        return Err(shape_error(format!(
                            "all.children.{name} must be a mapping"
                        )));
                    }
                }
            }
            Ok(())
        }
        Some(_) => Err(shape_error("'all.children' must be a mapping")),
    }
}

fn validate_hosts(hosts: &Value, location: &str) -> Result<()> {
    match hosts {
        Value::Null => Ok(()),
        Value::Mapping(hosts) => {
            if hosts.keys().all(Value::is_string) {
                Ok(())
            } else {
                Err(shape_error(format!("{location} keys must be strings")))
            }
        }
        _ => Err(shape_error(format!("{location} must be a mapping"))),
    }
}

fn shape_error(message: impl Into<String>) -> Error {
    Error::Parse {
        document: "inventory",
        message: message.into(),
    }
}
