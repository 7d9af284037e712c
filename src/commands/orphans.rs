use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use reconcile::{DeleteReport, FileStore, OrphanFile, scan_orphans};
use serde::Serialize;

use crate::Context;
use crate::cli::OrphansArgs;
use crate::session::Session;
use crate::ui;

#[derive(Debug, Serialize)]
struct OrphanView<'a> {
    alias: &'a str,
    path: &'a str,
    kind: String,
}

pub fn run(ctx: &Context, args: OrphansArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let orphans = scan_orphans(session.store(), &session.workspace, session.inventory_path())
        .context("Could not scan for orphaned files")?;

    if args.json {
        let views: Vec<OrphanView<'_>> = orphans
            .iter()
            .map(|o| OrphanView {
                alias: &o.alias,
                path: &o.path,
                kind: format!("{:?}", o.kind),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&views)?);
        return session.finish();
    }

    if orphans.is_empty() {
        if !ctx.quiet {
            ui::success("No orphaned files");
        }
        return session.finish();
    }

    ui::header(&format!("Orphaned files in {}", session.workspace));
    for orphan in &orphans {
        println!("  {:<20} {}", orphan.alias.yellow(), orphan.path);
    }

    if !args.delete {
        println!();
        ui::dim("Run with --delete to remove them.");
        return session.finish();
    }

    println!();
    if !super::confirm(&format!("Delete {} file(s)?", orphans.len()), args.yes)? {
        ui::info("Cancelled");
        return session.finish();
    }

    let report = delete_with_progress(session.store(), &session.workspace, &orphans);
    if let Err(e) = session.engine.refresh_listing() {
        log::debug!("Listing refresh failed: {e}");
    }
    session.finish()?;

    if !report.is_complete() {
        for (path, error) in &report.failed {
            ui::error(&format!("{path}: {error}"));
        }
        bail!(
            "Deleted {} of {} file(s)",
            report.deleted.len(),
            orphans.len()
        );
    }
    ui::success(&format!("Deleted {} file(s)", report.deleted.len()));
    Ok(())
}

/// Delete one file at a time behind a progress bar
fn delete_with_progress(
    store: &dyn FileStore,
    workspace: &str,
    orphans: &[OrphanFile],
) -> DeleteReport {
    let pb = ProgressBar::new(orphans.len() as u64);
    match ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}") {
        Ok(style) => pb.set_style(style.progress_chars("=>-")),
        Err(e) => log::debug!("Invalid progress template: {e}"),
    }

    let mut report = DeleteReport::default();
    for orphan in orphans {
        pb.set_message(orphan.path.clone());
        let single = reconcile::delete_orphans(store, workspace, std::slice::from_ref(orphan));
        report.deleted.extend(single.deleted);
        report.failed.extend(single.failed);
        pb.inc(1);
    }
    pb.finish_and_clear();
    report
}
