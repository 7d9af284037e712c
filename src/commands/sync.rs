use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use reconcile::{MemoryStore, PassOutcome, Reconciler};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use crate::Context;
use crate::session::{self, Session};
use crate::ui;

// ============================================================================
// Sync
// ============================================================================

pub fn sync(ctx: &Context, dry_run: bool) -> Result<()> {
    if dry_run {
        return sync_dry_run(ctx);
    }

    let session = Session::open(ctx)?;
    if let PassOutcome::Failed(error) = &session.opened {
        bail!("Could not read {}: {error}", session.inventory_path());
    }
    let pushed = session.engine.sync_selection_to_inventory();
    let report = session.settle();

    if !ctx.quiet {
        ui::header(&format!("Sync {}", session.workspace));
        ui::kv("Inventory -> selection", &outcome_label(&session.opened));
        ui::kv("Selection -> inventory", &outcome_label(&pushed));
        if !report.host_vars_written.is_empty() {
            ui::kv("Host vars written", &report.host_vars_written.join(", "));
        }
        if let Some(message) = session::describe(&pushed) {
            println!();
            ui::info(&message);
        }
    }
    session.finish()
}

fn sync_dry_run(ctx: &Context) -> Result<()> {
    let session = Session::open_offline(ctx)?;
    let path = session.inventory_path().to_string();
    let current = session
        .store()
        .read_file(&session.workspace, &path)
        .with_context(|| format!("Could not read {path}"))?;
    let proposed = preview(&session, current.as_deref())?;

    ui::header(&format!("Sync {} (dry run)", session.workspace));
    match proposed {
        None => ui::success(&format!("{path} is up to date")),
        Some(proposed) => {
            println!("  {}", path.bold());
            show_text_diff(current.as_deref().unwrap_or_default(), &proposed);
            println!();
            ui::dim("Run without --dry-run to write these changes.");
        }
    }
    Ok(())
}

/// Inventory text a sync would write, or `None` if it would write nothing.
///
/// Runs a throwaway engine over an in-memory copy of the inventory, seeded
/// with the saved state of the workspace.
pub(crate) fn preview(session: &Session, current: Option<&str>) -> Result<Option<String>> {
    let path = session.inventory_path();
    let scratch = match current {
        Some(content) => MemoryStore::new().with_file(&session.workspace, path, content),
        None => MemoryStore::new(),
    };
    let scratch = Rc::new(scratch);
    let engine = Reconciler::new(scratch.clone(), session.engine.config().clone());
    if let PassOutcome::Failed(error) =
        engine.open_workspace(&session.workspace, session.engine.export_state())
    {
        bail!("Could not preview {path}: {error}");
    }

    let proposed = scratch.content(&session.workspace, path);
    Ok(proposed.filter(|proposed| Some(proposed.as_str()) != current))
}

/// Show a text diff using the `similar` crate
fn show_text_diff(before: &str, after: &str) {
    let diff = similar::TextDiff::from_lines(before, after);
    for change in diff.iter_all_changes() {
        match change.tag() {
            similar::ChangeTag::Delete => print!("    {}", format!("- {change}").red()),
            similar::ChangeTag::Insert => print!("    {}", format!("+ {change}").green()),
            similar::ChangeTag::Equal => print!("    {}", format!("  {change}").dimmed()),
        }
    }
}

fn outcome_label(outcome: &PassOutcome) -> String {
    match outcome {
        PassOutcome::Applied => "applied".green().to_string(),
        PassOutcome::Unchanged => "up to date".dimmed().to_string(),
        PassOutcome::Skipped(reason) => format!("skipped ({reason})").yellow().to_string(),
        PassOutcome::Superseded => "superseded".yellow().to_string(),
        PassOutcome::Failed(error) => format!("failed: {error}").red().to_string(),
    }
}

// ============================================================================
// Pull
// ============================================================================

pub fn pull(ctx: &Context) -> Result<()> {
    let session = Session::open(ctx)?;
    if let PassOutcome::Failed(error) = &session.opened {
        bail!("Could not read {}: {error}", session.inventory_path());
    }
    let updated = pull_host_vars(&session);

    if !ctx.quiet {
        if let Some(message) = session::describe(&session.opened) {
            ui::info(&message);
        }
        if updated.is_empty() {
            ui::success("Host vars up to date");
        } else {
            ui::success(&format!("Updated from host vars: {}", updated.join(", ")));
        }
    }
    session.finish()
}

/// Re-read the host vars of every registered host, returning the aliases
/// whose record changed.
pub(crate) fn pull_host_vars(session: &Session) -> Vec<String> {
    let hosts = session.engine.hosts();
    hosts
        .aliases()
        .filter(|alias| match session.engine.pull_host_vars(alias) {
            Ok(changed) => changed,
            Err(e) => {
                ui::warn(&format!("Could not read host vars of {alias}: {e}"));
                false
            }
        })
        .map(str::to_string)
        .collect()
}

// ============================================================================
// Watch
// ============================================================================

pub fn watch(ctx: &Context, interval_ms: Option<u64>, iterations: Option<u64>) -> Result<()> {
    let mut session = Session::open(ctx)?;
    let interval = interval_ms.map_or_else(|| session.config.poll_interval(), Duration::from_millis);
    if interval < Duration::from_millis(250) {
        bail!("--interval must be at least 250 ms");
    }

    if !ctx.quiet {
        ui::info(&format!(
            "Watching {} every {} ms (Ctrl-C to stop)",
            session.workspace,
            interval.as_millis()
        ));
        if let Some(message) = session::describe(&session.opened) {
            ui::info(&message);
        }
    }
    session.save()?;

    let mut polls = 0u64;
    while iterations.is_none_or(|limit| polls < limit) {
        thread::sleep(interval);
        polls += 1;

        let outcome = session.engine.poll();
        let report = session.engine.tick(Instant::now());
        match &outcome {
            PassOutcome::Applied => {
                if !ctx.quiet {
                    ui::success(&format!(
                        "{} Inventory changed, selection updated",
                        chrono::Local::now().format("%H:%M:%S")
                    ));
                }
            }
            PassOutcome::Failed(error) => ui::error(error),
            _ => {}
        }
        for (alias, error) in &report.host_vars_failed {
            ui::warn(&format!("Host vars for {alias} not written: {error}"));
        }
        if outcome.is_applied() || !report.is_empty() {
            session.save()?;
        }
    }

    session.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{WS, session};
    use tempfile::TempDir;

    const INVENTORY: &str = "inventory.yml";

    #[test]
    fn test_preview_reports_pending_write_without_writing() {
        let dir = TempDir::new().unwrap();
        let store = Rc::new(MemoryStore::new());
        let live = session(&store, &dir);
        live.engine.set_connectivity(false);
        live.engine
            .edit_selection(|s| s.select_role("web", "nginx"))
            .unwrap();

        let proposed = preview(&live, None).unwrap().unwrap();
        assert!(proposed.contains("nginx"));
        assert!(store.content(WS, INVENTORY).is_none());
    }

    #[test]
    fn test_preview_of_synced_workspace_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = Rc::new(MemoryStore::new());
        let live = session(&store, &dir);
        live.engine
            .edit_selection(|s| s.select_role("web", "nginx"))
            .unwrap();

        let current = store.content(WS, INVENTORY);
        assert_eq!(preview(&live, current.as_deref()).unwrap(), None);
    }

    #[test]
    fn test_pull_host_vars_absorbs_external_edits() {
        let dir = TempDir::new().unwrap();
        let store = Rc::new(MemoryStore::new());
        let live = session(&store, &dir);
        let mut record = reconcile::HostRecord::new("web", "10.0.0.1", "root");
        record.password = Some("secret".into());
        live.engine.add_host(record).unwrap();

        let path = inventory::paths::host_vars_path("web");
        let edited = store
            .content(WS, &path)
            .unwrap()
            .replace("10.0.0.1", "10.0.0.9");
        store.insert(WS, &path, &edited);

        assert_eq!(pull_host_vars(&live), vec!["web".to_string()]);
        assert_eq!(live.engine.host("web").unwrap().host, "10.0.0.9");
        assert!(pull_host_vars(&live).is_empty());
    }
}
