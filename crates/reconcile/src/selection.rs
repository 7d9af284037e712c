//! Per-host role selection.
//!
//! Holds `alias -> roles` plus an optional plan per selected role. A plan
//! can only exist for a selected role; deselecting a role drops its plan.
//! Every effective mutation bumps [`SelectionStore::revision`].

use crate::error::{Error, Result};
use inventory::{RoleChange, RolesByAlias, normalize_role_id, validate_alias};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Selection state for one workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionStore {
    #[serde(default)]
    roles: RolesByAlias,
    #[serde(default)]
    plans: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(skip)]
    revision: u64,
}

impl SelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an existing mapping.
    pub fn from_roles(roles: RolesByAlias) -> Self {
        Self {
            roles,
            ..Self::default()
        }
    }

    /// Monotonic change counter.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn roles(&self) -> &RolesByAlias {
        &self.roles
    }

    /// Selected roles of one alias.
    pub fn roles_of(&self, alias: &str) -> Option<&BTreeSet<String>> {
        self.roles.roles(alias)
    }

    pub fn contains_alias(&self, alias: &str) -> bool {
        self.roles.contains_alias(alias)
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Chosen plan of a selected role.
    pub fn plan(&self, alias: &str, role: &str) -> Option<&str> {
        self.plans.get(alias)?.get(role).map(String::as_str)
    }

    /// Make an alias known with no roles.
    pub fn ensure_alias(&mut self, alias: &str) -> Result<bool> {
        validate_alias(alias)?;
        let added = self.roles.insert_alias(alias);
        Ok(self.bump_if(added))
    }

    /// Select a role. Returns false if it was already selected.
    pub fn select_role(&mut self, alias: &str, role: &str) -> Result<bool> {
        validate_alias(alias)?;
        let role = normalize_role_id(role)?;
        let added = self.roles.add_role(alias, role);
        Ok(self.bump_if(added))
    }

    /// Deselect a role and drop its plan.
    pub fn deselect_role(&mut self, alias: &str, role: &str) -> bool {
        let role = role.trim();
        let removed = self.roles.remove_role(alias, role);
        let dropped = self.drop_plan(alias, role);
        self.bump_if(removed || dropped)
    }

    /// Flip a role. Returns whether it is selected afterwards.
    pub fn toggle_role(&mut self, alias: &str, role: &str) -> Result<bool> {
        let selected = self
            .roles_of(alias)
            .is_some_and(|roles| roles.contains(role.trim()));
        if selected {
            self.deselect_role(alias, role);
            Ok(false)
        } else {
            self.select_role(alias, role)?;
            Ok(true)
        }
    }

    /// Replace the role set of an alias. Ids are trimmed, validated and
    /// de-duplicated; plans of dropped roles are removed.
    pub fn set_roles<I, S>(&mut self, alias: &str, roles: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        validate_alias(alias)?;
        let roles = roles
            .into_iter()
            .map(|r| normalize_role_id(r.as_ref()))
            .collect::<inventory::Result<BTreeSet<_>>>()?;
        if self.roles.roles(alias) == Some(&roles) {
            return Ok(false);
        }
        if let Some(plans) = self.plans.get_mut(alias) {
            plans.retain(|role, _| roles.contains(role));
        }
        self.roles.set_roles(alias, roles);
        Ok(self.bump_if(true))
    }

    /// Choose a plan for a selected role, or clear it with `None`.
    pub fn set_plan(&mut self, alias: &str, role: &str, plan: Option<&str>) -> Result<bool> {
        let Some(plan) = plan.map(str::trim).filter(|p| !p.is_empty()) else {
            let dropped = self.drop_plan(alias, role);
            return Ok(self.bump_if(dropped));
        };
        if !self.roles_of(alias).is_some_and(|r| r.contains(role)) {
            return Err(Error::Codec(inventory::Error::InvalidField {
                field: "plan",
                message: format!("role '{role}' is not selected on '{alias}'"),
            }));
        }
        let plans = self.plans.entry(alias.to_string()).or_default();
        if plans.get(role).map(String::as_str) == Some(plan) {
            return Ok(false);
        }
        plans.insert(role.to_string(), plan.to_string());
        Ok(self.bump_if(true))
    }

    /// Forget an alias entirely.
    pub fn remove_alias(&mut self, alias: &str) -> bool {
        let removed = self.roles.remove_alias(alias).is_some();
        let dropped = self.plans.remove(alias).is_some();
        self.bump_if(removed || dropped)
    }

    /// Move roles and plans to a new alias. False if `from` is unknown or
    /// `to` is taken.
    pub fn rename_alias(&mut self, from: &str, to: &str) -> bool {
        if !self.roles.rename_alias(from, to) {
            return false;
        }
        if let Some(plans) = self.plans.remove(from) {
            self.plans.insert(to.to_string(), plans);
        }
        self.bump_if(true)
    }

    /// Add every alias and role of `other`, keeping what is already here.
    pub fn merge_union(&mut self, other: &RolesByAlias) -> bool {
        let mut changed = false;
        for (alias, roles) in other.iter() {
            changed |= self.roles.insert_alias(alias);
            for role in roles {
                changed |= self.roles.add_role(alias, role.clone());
            }
        }
        self.bump_if(changed)
    }

    /// Apply role changes computed between two inventory versions.
    ///
    /// An alias removed from the inventory is forgotten along with its
    /// roles and plans.
    pub fn apply_changes(&mut self, changes: &[RoleChange]) -> bool {
        let mut changed = false;
        for change in changes {
            changed |= match change {
                RoleChange::AliasAdded { alias } => self.roles.insert_alias(alias),
                RoleChange::AliasRemoved { alias } => {
                    let removed = self.roles.remove_alias(alias).is_some();
                    self.plans.remove(alias).is_some() || removed
                }
                RoleChange::RoleAdded { alias, role } => self.roles.add_role(alias, role.clone()),
                RoleChange::RoleRemoved { alias, role } => {
                    let removed = self.roles.remove_role(alias, role);
                    self.drop_plan(alias, role) || removed
                }
            };
        }
        self.bump_if(changed)
    }

    fn drop_plan(&mut self, alias: &str, role: &str) -> bool {
        let Some(plans) = self.plans.get_mut(alias) else {
            return false;
        };
        let dropped = plans.remove(role).is_some();
        if plans.is_empty() {
            self.plans.remove(alias);
        }
        dropped
    }

    fn bump_if(&mut self, changed: bool) -> bool {
        if changed {
            self.revision += 1;
        }
        changed
    }
}
