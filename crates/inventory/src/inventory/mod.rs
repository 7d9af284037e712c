//! Ansible-style inventory document.
//!
//! The engine only cares about the `alias -> roles` shape, but the document
//! is kept as a raw YAML mapping so host variables, group variables and any
//! unknown keys survive a rewrite.

mod parser;
mod writer;

pub use parser::parse_string;
pub use writer::write_string;

use crate::types::RolesByAlias;
use serde_yaml::{Mapping, Value};

pub(crate) const ALL: &str = "all";
pub(crate) const HOSTS: &str = "hosts";
pub(crate) const CHILDREN: &str = "children";

/// A parsed inventory document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InventoryDocument {
    pub(crate) root: Mapping,
}

impl InventoryDocument {
    /// Create an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fresh document holding exactly the given mapping.
    pub fn from_roles(roles: &RolesByAlias) -> Self {
        let mut doc = Self::new();
        doc.apply_roles(roles);
        doc
    }

    /// Extract the canonical `alias -> roles` mapping.
    ///
    /// Aliases come from `all.hosts` and from the `hosts` of every group
    /// under `all.children`; each group name is a role id.
    pub fn roles_by_alias(&self) -> RolesByAlias {
        let mut roles = RolesByAlias::new();
        let Some(all) = self.all() else {
            return roles;
        };

        if let Some(hosts) = mapping_at(all, HOSTS) {
            for alias in hosts.keys().filter_map(Value::as_str) {
                roles.insert_alias(alias);
            }
        }

        if let Some(children) = mapping_at(all, CHILDREN) {
            for (role, group) in children {
                let (Some(role), Some(group)) = (role.as_str(), group.as_mapping()) else {
                    continue;
                };
                if let Some(hosts) = mapping_at(group, HOSTS) {
                    for alias in hosts.keys().filter_map(Value::as_str) {
                        roles.add_role(alias, role);
                    }
                }
            }
        }

        roles
    }

    /// Rewrite hosts and role groups to match `roles` exactly.
    ///
    /// Existing host entries keep their variables, role groups keep their
    /// non-host keys. Groups that lose all hosts are dropped unless they
    /// carry other keys.
    pub fn apply_roles(&mut self, roles: &RolesByAlias) {
        writer::apply_roles(&mut self.root, roles);
    }

    /// Rename an alias everywhere it appears, preserving its variables.
    ///
    /// Returns false if `from` is absent or `to` is already present.
    pub fn rename_alias(&mut self, from: &str, to: &str) -> bool {
        let mut roles = self.roles_by_alias();
        if !roles.rename_alias(from, to) {
            return false;
        }
        writer::rename_host_entries(&mut self.root, from, to);
        self.apply_roles(&roles);
        true
    }

    /// Remove an alias and every group membership. Returns false if absent.
    pub fn remove_alias(&mut self, alias: &str) -> bool {
        let mut roles = self.roles_by_alias();
        if roles.remove_alias(alias).is_none() {
            return false;
        }
        self.apply_roles(&roles);
        true
    }

    /// Make sure an alias is listed under `all.hosts`. Returns true if added.
    pub fn ensure_alias(&mut self, alias: &str) -> bool {
        let mut roles = self.roles_by_alias();
        if !roles.insert_alias(alias) {
            return false;
        }
        self.apply_roles(&roles);
        true
    }

    /// Serialize back to YAML.
    pub fn to_yaml(&self) -> crate::Result<String> {
        write_string(self)
    }

    fn all(&self) -> Option<&Mapping> {
        mapping_at(&self.root, ALL)
    }
}

pub(crate) fn mapping_at<'a>(mapping: &'a Mapping, key: &str) -> Option<&'a Mapping> {
    mapping.get(key).and_then(Value::as_mapping)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r"
all:
  hosts:
    web:
      ansible_connection: ssh
    spare: {}
  children:
    nginx:
      hosts:
        web: {}
    redis:
      vars:
        redis_port: 6379
      hosts:
        web: {}
        cache: {}
";

    #[test]
    fn test_roles_by_alias() {
        let doc = parse_string(SAMPLE).unwrap();
        let roles = doc.roles_by_alias();

        assert_eq!(roles.len(), 3);
        assert_eq!(
            roles.roles("web").unwrap().iter().collect::<Vec<_>>(),
            vec!["nginx", "redis"]
        );
        assert!(roles.roles("spare").unwrap().is_empty());
        assert!(roles.roles("cache").unwrap().contains("redis"));
    }

    #[test]
    fn test_rename_preserves_host_vars() {
        let mut doc = parse_string(SAMPLE).unwrap();
        assert!(doc.rename_alias("web", "edge"));

        let roles = doc.roles_by_alias();
        assert!(!roles.contains_alias("web"));
        assert_eq!(roles.roles("edge").unwrap().len(), 2);

        let yaml = doc.to_yaml().unwrap();
        assert!(yaml.contains("ansible_connection: ssh"));
        assert!(yaml.contains("redis_port: 6379"));
    }

    #[test]
    fn test_rename_rejects_existing_target() {
        let mut doc = parse_string(SAMPLE).unwrap();
        assert!(!doc.rename_alias("web", "cache"));
        assert!(!doc.rename_alias("nobody", "x"));
        assert_eq!(doc, parse_string(SAMPLE).unwrap());
    }

    #[test]
    fn test_remove_alias() {
        let mut doc = parse_string(SAMPLE).unwrap();
        assert!(doc.remove_alias("web"));
        let roles = doc.roles_by_alias();
        assert!(!roles.contains_alias("web"));
        assert!(roles.contains_alias("cache"));

        // nginx lost its only host and carried nothing else
        let yaml = doc.to_yaml().unwrap();
        assert!(!yaml.contains("nginx"));
        // redis keeps its vars
        assert!(yaml.contains("redis_port"));
        assert!(!doc.remove_alias("web"));
    }

    #[test]
    fn test_ensure_alias() {
        let mut doc = InventoryDocument::new();
        assert!(doc.ensure_alias("web"));
        assert!(!doc.ensure_alias("web"));
        assert!(doc.roles_by_alias().contains_alias("web"));
    }

    #[test]
    fn test_from_roles_then_parse() {
        let roles = RolesByAlias::from_pairs([("web", vec!["nginx", "redis"]), ("db", vec![])]);
        let yaml = InventoryDocument::from_roles(&roles).to_yaml().unwrap();
        let parsed = parse_string(&yaml).unwrap();
        assert_eq!(parsed.roles_by_alias(), roles);
    }
}
