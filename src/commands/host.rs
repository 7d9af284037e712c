use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use dialoguer::Password;
use reconcile::{AuthMethod, HostRecord};
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Instant;

use crate::Context;
use crate::cli::{HostAddArgs, HostFieldArgs, HostSetArgs};
use crate::session::Session;
use crate::ui;

/// A host as shown to the user, with its selected roles
#[derive(Debug, Serialize)]
struct HostView {
    #[serde(flatten)]
    record: HostRecord,
    roles: BTreeSet<String>,
}

// ============================================================================
// Add / Set
// ============================================================================

pub fn add(ctx: &Context, args: HostAddArgs) -> Result<()> {
    let auth = AuthMethod::from(args.auth);
    let secret = match args.secret.clone() {
        Some(secret) => secret,
        None => prompt_secret(&args.alias, auth)?,
    };
    let record = build_record(args, secret);

    let session = Session::open(ctx)?;
    let alias = record.alias.clone();
    let result = session.engine.add_host(record);
    if let Err(e) = &result
        && session.engine.host(&alias).is_none()
    {
        bail!("Could not add {alias}: {e}");
    }

    match result {
        Ok(()) if !ctx.quiet => ui::success(&format!("Added {alias}")),
        Ok(()) => {}
        Err(e) => ui::warn(&format!(
            "Added {alias}, but its host vars were not written: {e}"
        )),
    }
    session.finish()
}

pub fn set(ctx: &Context, args: HostSetArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    update(&session, &args)?;
    let report = session.settle();

    if !ctx.quiet {
        if report.host_vars_written.iter().any(|a| *a == args.alias) {
            ui::success(&format!("Updated {} and its host vars", args.alias));
        } else if report.host_vars_failed.is_empty() {
            ui::success(&format!("Updated {} (host vars already current)", args.alias));
        }
    }
    session.finish()
}

fn build_record(args: HostAddArgs, secret: String) -> HostRecord {
    let mut record = HostRecord::new(args.alias, args.host, args.user);
    record.port = args.port;
    record.auth = args.auth.into();
    match record.auth {
        AuthMethod::Password => record.password = Some(secret),
        AuthMethod::PrivateKey => record.private_key = Some(secret),
    }
    apply_fields(&mut record, &args.fields);
    record
}

/// Schedule the host-vars write for the changed fields
pub(crate) fn update(session: &Session, args: &HostSetArgs) -> Result<()> {
    session
        .engine
        .update_host(&args.alias, Instant::now(), |record| {
            if let Some(host) = &args.host {
                record.host.clone_from(host);
            }
            if let Some(user) = &args.user {
                record.user.clone_from(user);
            }
            if let Some(port) = args.port {
                record.port = port;
            }
            apply_fields(record, &args.fields);
        })
        .with_context(|| format!("Could not update {}", args.alias))
}

fn apply_fields(record: &mut HostRecord, fields: &HostFieldArgs) {
    // An empty value clears the field
    let set = |slot: &mut Option<String>, value: &Option<String>| {
        if let Some(value) = value {
            *slot = Some(value.clone()).filter(|v| !v.trim().is_empty());
        }
    };
    set(&mut record.color, &fields.color);
    set(&mut record.logo, &fields.logo);
    set(&mut record.description, &fields.description);
    set(&mut record.primary_domain, &fields.domain);
}

fn prompt_secret(alias: &str, auth: AuthMethod) -> Result<String> {
    if !ui::is_interactive() {
        bail!("No secret for {alias}: pass --secret or set HOSTSYNC_HOST_SECRET");
    }
    let prompt = match auth {
        AuthMethod::Password => format!("SSH password for {alias}"),
        AuthMethod::PrivateKey => format!("Private key for {alias}"),
    };
    Password::new()
        .with_prompt(prompt)
        .interact()
        .context("Failed to read secret")
}

// ============================================================================
// Show / List
// ============================================================================

pub fn show(ctx: &Context, alias: &str, json: bool) -> Result<()> {
    let session = Session::open(ctx)?;
    let view = view(&session, alias)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        let record = &view.record;
        ui::header(&format!("Host {}", record.alias));
        ui::kv("Address", &format!("{}@{}:{}", record.user, record.host, record.port));
        ui::kv("Auth", &record.auth.to_string());
        ui::kv("Roles", &ui::roles(&view.roles));
        for (key, value) in [
            ("Description", &record.description),
            ("Domain", &record.primary_domain),
            ("Color", &record.color),
            ("Logo", &record.logo),
        ] {
            if let Some(value) = value {
                ui::kv(key, value);
            }
        }
        if record.host.is_empty() {
            println!();
            ui::dim("Imported from the inventory; set its address with 'hostsync host set'.");
        }
    }
    session.finish()
}

pub fn list(ctx: &Context, json: bool) -> Result<()> {
    let session = Session::open(ctx)?;
    let views = session
        .engine
        .hosts()
        .aliases()
        .map(|alias| view(&session, alias))
        .collect::<Result<Vec<_>>>()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
    } else if views.is_empty() {
        ui::info("No hosts yet. Add one with 'hostsync host add'.");
    } else {
        ui::header(&format!("Hosts in {}", session.workspace));
        for view in &views {
            let address = if view.record.host.is_empty() {
                "(no address)".dimmed().to_string()
            } else {
                format!("{}@{}", view.record.user, view.record.host)
            };
            println!(
                "  {:<20} {:<30} {}",
                view.record.alias.cyan(),
                address,
                ui::roles(&view.roles).dimmed()
            );
        }
    }
    session.finish()
}

fn view(session: &Session, alias: &str) -> Result<HostView> {
    let record = session
        .engine
        .host(alias)
        .with_context(|| format!("Unknown host '{alias}'"))?;
    let roles = session
        .engine
        .selection()
        .roles_of(alias)
        .cloned()
        .unwrap_or_default();
    Ok(HostView { record, roles })
}
