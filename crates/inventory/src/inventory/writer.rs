//! Writer for inventory documents.
//!
//! Hosts and groups are emitted sorted so that the same mapping always
//! produces byte-identical output.

use super::{ALL, CHILDREN, HOSTS, InventoryDocument};
use crate::error::Result;
use crate::types::RolesByAlias;
use serde_yaml::{Mapping, Value};

/// Serialize an inventory document.
pub fn write_string(doc: &InventoryDocument) -> Result<String> {
    if doc.root.is_empty() {
        return Ok(String::new());
    }
    Ok(serde_yaml::to_string(&doc.root)?)
}

/// Rebuild `all.hosts` and `all.children` so they describe `roles`.
pub(super) fn apply_roles(root: &mut Mapping, roles: &RolesByAlias) {
    let old_all = match root.get(ALL) {
        Some(Value::Mapping(all)) => all.clone(),
        _ => Mapping::new(),
    };

    let old_hosts = take_mapping(&old_all, HOSTS);
    let mut hosts = Mapping::new();
    for alias in roles.aliases() {
        hosts.insert(alias.into(), host_entry(&old_hosts, alias));
    }

    let old_children = take_mapping(&old_all, CHILDREN);
    let wanted = roles.aliases_by_role();
    let mut children = Mapping::new();

    // Groups in sorted order: every wanted role plus leftover groups that
    // still carry variables.
    let mut names: Vec<String> = wanted.keys().map(|r| (*r).to_string()).collect();
    for name in old_children.keys().filter_map(Value::as_str) {
        if !wanted.contains_key(name) && group_has_extras(&old_children, name) {
            names.push(name.to_string());
        }
    }
    names.sort();

    for name in names {
        let mut group = take_mapping(&old_children, &name);
        let old_group_hosts = take_mapping(&group, HOSTS);
        match wanted.get(name.as_str()) {
            Some(members) => {
                let mut group_hosts = Mapping::new();
                for alias in members {
                    group_hosts.insert((*alias).into(), host_entry(&old_group_hosts, alias));
                }
                group.insert(HOSTS.into(), Value::Mapping(group_hosts));
            }
            None => {
                group.remove(HOSTS);
            }
        }
        children.insert(name.into(), Value::Mapping(group));
    }

    let mut all = Mapping::new();
    all.insert(HOSTS.into(), Value::Mapping(hosts));
    if !children.is_empty() {
        all.insert(CHILDREN.into(), Value::Mapping(children));
    }
    for (key, value) in &old_all {
        if key.as_str() != Some(HOSTS) && key.as_str() != Some(CHILDREN) {
            all.insert(key.clone(), value.clone());
        }
    }

    if root.contains_key(ALL) {
        if let Some(slot) = root.get_mut(ALL) {
            *slot = Value::Mapping(all);
        }
    } else {
        root.insert(ALL.into(), Value::Mapping(all));
    }
}

/// Move host entries keyed by `from` to `to` so their variables follow
/// the rename. Group memberships are rebuilt by `apply_roles` afterwards.
pub(super) fn rename_host_entries(root: &mut Mapping, from: &str, to: &str) {
    let Some(Value::Mapping(all)) = root.get_mut(ALL) else {
        return;
    };

    if let Some(Value::Mapping(hosts)) = all.get_mut(HOSTS) {
        rename_key(hosts, from, to);
    }

    if let Some(Value::Mapping(children)) = all.get_mut(CHILDREN) {
        for (_, group) in children.iter_mut() {
            if let Value::Mapping(group) = group
                && let Some(Value::Mapping(hosts)) = group.get_mut(HOSTS)
            {
                rename_key(hosts, from, to);
            }
        }
    }
}

fn rename_key(mapping: &mut Mapping, from: &str, to: &str) {
    if let Some(value) = mapping.remove(from) {
        mapping.insert(to.into(), value);
    }
}

fn take_mapping(mapping: &Mapping, key: &str) -> Mapping {
    match mapping.get(key) {
        Some(Value::Mapping(inner)) => inner.clone(),
        _ => Mapping::new(),
    }
}

/// Existing host entry, or `{}` when absent or null.
fn host_entry(hosts: &Mapping, alias: &str) -> Value {
    match hosts.get(alias) {
        Some(Value::Mapping(vars)) => Value::Mapping(vars.clone()),
        _ => Value::Mapping(Mapping::new()),
    }
}

fn group_has_extras(children: &Mapping, name: &str) -> bool {
    match children.get(name) {
        Some(Value::Mapping(group)) => group.keys().any(|k| k.as_str() != Some(HOSTS)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::super::parse_string;
    use super::*;

    #[test]
    fn test_write_canonical_layout() {
        let roles = RolesByAlias::from_pairs([("web", vec!["redis", "nginx"]), ("db", vec![])]);
        let yaml = InventoryDocument::from_roles(&roles).to_yaml().unwrap();

        let expected = "\
all:
  hosts:
    db: {}
    web: {}
  children:
    nginx:
      hosts:
        web: {}
    redis:
      hosts:
        web: {}
";
        assert_eq!(yaml, expected);
    }

    #[test]
    fn test_write_is_deterministic() {
        let a = RolesByAlias::from_pairs([("b", vec!["y", "x"]), ("a", vec!["x"])]);
        let b = RolesByAlias::from_pairs([("a", vec!["x"]), ("b", vec!["x", "y"])]);
        assert_eq!(
            InventoryDocument::from_roles(&a).to_yaml().unwrap(),
            InventoryDocument::from_roles(&b).to_yaml().unwrap()
        );
    }

    #[test]
    fn test_write_empty_document() {
        assert_eq!(write_string(&InventoryDocument::new()).unwrap(), "");
    }

    #[test]
    fn test_apply_keeps_other_all_keys() {
        let mut doc = parse_string("all:\n  vars:\n    ansible_python_interpreter: /usr/bin/python3\n").unwrap();
        doc.apply_roles(&RolesByAlias::from_pairs([("web", vec!["nginx"])]));
        let yaml = doc.to_yaml().unwrap();
        assert!(yaml.contains("ansible_python_interpreter"));
        assert!(doc.roles_by_alias().roles("web").unwrap().contains("nginx"));
    }

    #[test]
    fn test_apply_keeps_group_host_vars() {
        let mut doc = parse_string(
            "all:\n  children:\n    nginx:\n      hosts:\n        web:\n          nginx_workers: 4\n",
        )
        .unwrap();
        doc.apply_roles(&RolesByAlias::from_pairs([("web", vec!["nginx", "redis"])]));
        let yaml = doc.to_yaml().unwrap();
        assert!(yaml.contains("nginx_workers: 4"));
    }
}
