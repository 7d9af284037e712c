use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use inventory::RolesByAlias;
use serde::Serialize;

use crate::Context;
use crate::session::{self, Session};
use crate::ui;

#[derive(Debug, Serialize)]
struct StatusReport {
    workspace: String,
    online: bool,
    inventory_path: String,
    inventory_ready: bool,
    seeded: bool,
    sync_error: Option<String>,
    pending_mutations: usize,
    hosts: usize,
    last_sync: Option<DateTime<Utc>>,
    selection: RolesByAlias,
}

pub fn run(ctx: &Context, json: bool) -> Result<()> {
    let session = Session::open(ctx)?;
    let status = session.engine.status();
    let report = StatusReport {
        workspace: session.workspace.clone(),
        online: status.online,
        inventory_path: session.inventory_path().to_string(),
        inventory_ready: status.inventory_ready,
        seeded: status.seeded,
        sync_error: status.sync_error,
        pending_mutations: status.pending_mutations,
        hosts: session.engine.hosts().len(),
        last_sync: session.last_sync(),
        selection: session.engine.selection().roles().clone(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        if !ctx.quiet
            && let Some(message) = session::describe(&session.opened)
        {
            ui::info(&message);
        }
        print_report(ctx, &report);
    }

    session.finish()
}

fn print_report(ctx: &Context, report: &StatusReport) {
    ui::header(&format!("Workspace {}", report.workspace));

    let online = if report.online {
        "online".green()
    } else {
        "offline".yellow()
    };
    ui::kv("Connectivity", &online.to_string());
    let inventory = if report.inventory_ready {
        format!("{} {}", "✓".green(), report.inventory_path)
    } else {
        format!("{} {} (not read)", "✗".red(), report.inventory_path)
    };
    ui::kv("Inventory", &inventory);
    ui::kv("Hosts", &report.hosts.to_string());
    let last_sync = report
        .last_sync
        .map_or_else(|| "never".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string());
    ui::kv("Last sync", &last_sync);
    if ctx.verbose > 0 {
        ui::kv("Seeded", &report.seeded.to_string());
        ui::kv("Pending mutations", &report.pending_mutations.to_string());
    }

    if let Some(error) = &report.sync_error {
        println!();
        ui::error(error);
    }

    ui::section("Selection");
    if report.selection.is_empty() {
        ui::dim("No hosts selected. Add one with 'hostsync host add'.");
        return;
    }
    for (alias, roles) in report.selection.iter() {
        println!("  {:<20} {}", alias.cyan(), ui::roles(roles));
    }
}
