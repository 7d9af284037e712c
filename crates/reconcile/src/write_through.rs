//! Host registry to host-vars write-through.
//!
//! Host edits restart a per-`(workspace, alias)` timer. When it fires the
//! host-vars file is read, diffed against the record, and written only if
//! a field differs. Unmanaged keys in the file are left alone.

use crate::engine::Reconciler;
use crate::error::{Error, Result};
use crate::hosts::HostRecord;
use inventory::HostVarsDocument;
use inventory::paths::host_vars_path;
use std::time::Instant;

impl Reconciler {
    /// Register a new host, seed its host-vars file and list it in the
    /// inventory.
    ///
    /// Validation happens before any I/O. If the host-vars write fails the
    /// host stays registered and the error is returned; the next edit of the
    /// host retries the write.
    pub fn add_host(&self, record: HostRecord) -> Result<()> {
        let ws = self.require_workspace()?;
        record.validate()?;
        if self.alias_taken(&record.alias) {
            return Err(Error::DuplicateAlias(record.alias));
        }

        let alias = record.alias.clone();
        self.hosts.borrow_mut().add(record)?;
        self.selection.borrow_mut().ensure_alias(&alias)?;
        log::info!("Added host {alias}");

        let written = self.flush_host_vars(&ws, &alias);
        self.on_selection_changed();
        written.map(|_| ())
    }

    /// Edit a registered host and schedule its host-vars write.
    ///
    /// The alias cannot be changed here; renames go through the mutation
    /// queue.
    pub fn update_host(
        &self,
        alias: &str,
        now: Instant,
        edit: impl FnOnce(&mut HostRecord),
    ) -> Result<()> {
        let ws = self.require_workspace()?;
        let mut record = self
            .host(alias)
            .ok_or_else(|| Error::UnknownAlias(alias.to_string()))?;
        edit(&mut record);
        record.alias = alias.to_string();
        record.validate_fields()?;

        if let Some(slot) = self.hosts.borrow_mut().get_mut(alias) {
            *slot = record;
        }
        self.host_vars_timers
            .borrow_mut()
            .schedule((ws, alias.to_string()), now);
        Ok(())
    }

    /// Whether a host-vars write for `alias` is waiting on its timer.
    pub fn host_vars_pending(&self, alias: &str) -> bool {
        self.workspace().is_some_and(|ws| {
            self.host_vars_timers
                .borrow()
                .is_pending(&(ws, alias.to_string()))
        })
    }

    /// Write the host-vars file of `alias` if it differs from the record.
    ///
    /// Returns true if a write happened.
    pub(crate) fn flush_host_vars(&self, workspace: &str, alias: &str) -> Result<bool> {
        let Some(vars) = self.hosts.borrow().get(alias).map(HostRecord::host_vars) else {
            return Ok(false);
        };
        let path = host_vars_path(alias);

        let mut doc = match self.store.read_file(workspace, &path)? {
            Some(content) => HostVarsDocument::parse(&content)?,
            None => HostVarsDocument::new(),
        };
        let patch = doc.diff(&vars);
        if patch.is_empty() {
            log::debug!("{path} already up to date");
            return Ok(false);
        }
        doc.apply(&patch);
        let yaml = doc.to_yaml()?;

        if !self.is_current(workspace) {
            return Ok(false);
        }
        self.store.write_file(workspace, &path, &yaml)?;
        log::info!("Updated {path} ({} field(s))", patch.len());
        Ok(true)
    }

    /// Copy the host-vars file of `alias` into its record.
    ///
    /// Skipped while a write for the alias is pending, so unsaved edits are
    /// never overwritten. Returns true if the record changed.
    pub fn pull_host_vars(&self, alias: &str) -> Result<bool> {
        let ws = self.require_workspace()?;
        if self
            .host_vars_timers
            .borrow()
            .is_pending(&(ws.clone(), alias.to_string()))
        {
            return Ok(false);
        }
        let Some(_token) = self.flags.host_vars.try_acquire() else {
            return Ok(false);
        };

        let Some(content) = self.store.read_file(&ws, &host_vars_path(alias))? else {
            return Ok(false);
        };
        let vars = HostVarsDocument::parse(&content)?.fields();
        if !self.is_current(&ws) {
            return Ok(false);
        }

        let mut hosts = self.hosts.borrow_mut();
        let changed = hosts
            .get_mut(alias)
            .is_some_and(|record| record.absorb_host_vars(&vars));
        if changed {
            log::debug!("Loaded host vars of {alias}");
        }
        Ok(changed)
    }

    /// Whether `alias` is used by the registry, the selection or the
    /// inventory.
    pub(crate) fn alias_taken(&self, alias: &str) -> bool {
        self.hosts.borrow().contains(alias)
            || self.selection.borrow().contains_alias(alias)
            || self
                .inventory
                .borrow()
                .snapshot
                .as_ref()
                .is_some_and(|roles| roles.contains_alias(alias))
    }
}
