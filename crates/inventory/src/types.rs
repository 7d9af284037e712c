//! Core types shared by the codecs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Canonical `alias -> roles` mapping.
///
/// Both levels are sorted, so two mappings with the same content compare
/// equal and serialize identically regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RolesByAlias(BTreeMap<String, BTreeSet<String>>);

impl RolesByAlias {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(alias, roles)` pairs.
    pub fn from_pairs<A, R, I>(pairs: impl IntoIterator<Item = (A, I)>) -> Self
    where
        A: Into<String>,
        R: Into<String>,
        I: IntoIterator<Item = R>,
    {
        let mut map = Self::new();
        for (alias, roles) in pairs {
            let alias = alias.into();
            map.insert_alias(&alias);
            for role in roles {
                map.add_role(&alias, role);
            }
        }
        map
    }

    /// Ensure an alias is present (with no roles if new). Returns true if added.
    pub fn insert_alias(&mut self, alias: &str) -> bool {
        if self.0.contains_key(alias) {
            return false;
        }
        self.0.insert(alias.to_string(), BTreeSet::new());
        true
    }

    /// Add a role to an alias, creating the alias if needed.
    pub fn add_role(&mut self, alias: &str, role: impl Into<String>) -> bool {
        self.0.entry(alias.to_string()).or_default().insert(role.into())
    }

    /// Remove a role from an alias. The alias itself stays.
    pub fn remove_role(&mut self, alias: &str, role: &str) -> bool {
        self.0.get_mut(alias).is_some_and(|roles| roles.remove(role))
    }

    /// Replace the full role set of an alias.
    pub fn set_roles(&mut self, alias: &str, roles: BTreeSet<String>) {
        self.0.insert(alias.to_string(), roles);
    }

    /// Remove an alias and its roles.
    pub fn remove_alias(&mut self, alias: &str) -> Option<BTreeSet<String>> {
        self.0.remove(alias)
    }

    /// Move the roles of `from` to `to`. Returns false if `from` is unknown
    /// or `to` already exists.
    pub fn rename_alias(&mut self, from: &str, to: &str) -> bool {
        if self.0.contains_key(to) {
            return false;
        }
        match self.0.remove(from) {
            Some(roles) => {
                self.0.insert(to.to_string(), roles);
                true
            }
            None => false,
        }
    }

    pub fn contains_alias(&self, alias: &str) -> bool {
        self.0.contains_key(alias)
    }

    /// Roles of an alias, if present.
    pub fn roles(&self, alias: &str) -> Option<&BTreeSet<String>> {
        self.0.get(alias)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.0.iter().map(|(alias, roles)| (alias.as_str(), roles))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Invert into `role -> aliases`, the shape of an Ansible inventory.
    pub fn aliases_by_role(&self) -> BTreeMap<&str, BTreeSet<&str>> {
        let mut groups: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (alias, roles) in &self.0 {
            for role in roles {
                groups.entry(role.as_str()).or_default().insert(alias.as_str());
            }
        }
        groups
    }
}

/// Change to apply to one alias when moving from one mapping to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleChange {
    /// Alias appeared
    AliasAdded { alias: String },
    /// Alias disappeared
    AliasRemoved { alias: String },
    /// Role enabled on an alias
    RoleAdded { alias: String, role: String },
    /// Role disabled on an alias
    RoleRemoved { alias: String, role: String },
}

/// Compute the changes that turn `before` into `after`.
pub fn diff_roles(before: &RolesByAlias, after: &RolesByAlias) -> Vec<RoleChange> {
    let mut changes = Vec::new();
    let empty = BTreeSet::new();

    for (alias, roles) in after.iter() {
        let previous = match before.roles(alias) {
            Some(previous) => previous,
            None => {
                changes.push(RoleChange::AliasAdded {
                    alias: alias.to_string(),
                });
                &empty
            }
        };
        for role in roles.difference(previous) {
            changes.push(RoleChange::RoleAdded {
                alias: alias.to_string(),
                role: role.clone(),
            });
        }
        for role in previous.difference(roles) {
            changes.push(RoleChange::RoleRemoved {
                alias: alias.to_string(),
                role: role.clone(),
            });
        }
    }

    for alias in before.aliases() {
        if !after.contains_alias(alias) {
            changes.push(RoleChange::AliasRemoved {
                alias: alias.to_string(),
            });
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_insensitive_equality() {
        let a = RolesByAlias::from_pairs([("web", ["redis", "nginx"])]);
        let b = RolesByAlias::from_pairs([("web", ["nginx", "redis"])]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_rename_alias() {
        let mut map = RolesByAlias::from_pairs([("web", ["nginx"]), ("db", ["postgres"])]);
        assert!(!map.rename_alias("web", "db"));
        assert!(!map.rename_alias("missing", "x"));
        assert!(map.rename_alias("web", "edge"));
        assert!(!map.contains_alias("web"));
        assert!(map.roles("edge").unwrap().contains("nginx"));
    }

    #[test]
    fn test_aliases_by_role() {
        let map = RolesByAlias::from_pairs([("web", vec!["nginx"]), ("edge", vec!["nginx", "redis"])]);
        let groups = map.aliases_by_role();
        assert_eq!(groups["nginx"].len(), 2);
        assert_eq!(groups["redis"].iter().copied().collect::<Vec<_>>(), vec!["edge"]);
    }

    #[test]
    fn test_diff_roles() {
        let before = RolesByAlias::from_pairs([("web", vec!["nginx"]), ("old", vec![])]);
        let after = RolesByAlias::from_pairs([("web", vec!["redis"]), ("new", vec!["mail"])]);
        let changes = diff_roles(&before, &after);

        assert!(changes.contains(&RoleChange::RoleAdded {
            alias: "web".into(),
            role: "redis".into()
        }));
        assert!(changes.contains(&RoleChange::RoleRemoved {
            alias: "web".into(),
            role: "nginx".into()
        }));
        assert!(changes.contains(&RoleChange::AliasAdded { alias: "new".into() }));
        assert!(changes.contains(&RoleChange::RoleAdded {
            alias: "new".into(),
            role: "mail".into()
        }));
        assert!(changes.contains(&RoleChange::AliasRemoved { alias: "old".into() }));
        assert_eq!(changes.len(), 5);
    }

    #[test]
    fn test_diff_roles_identical_is_empty() {
        let map = RolesByAlias::from_pairs([("web", ["nginx"])]);
        assert!(diff_roles(&map, &map.clone()).is_empty());
    }
}
