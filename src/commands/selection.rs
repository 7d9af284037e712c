use anyhow::Result;

use crate::Context;
use crate::session::Session;
use crate::ui;

pub fn select(ctx: &Context, alias: &str, roles: &[String]) -> Result<()> {
    let session = Session::open(ctx)?;
    if session.engine.host(alias).is_none() {
        ui::warn(&format!(
            "{alias} is not a registered host; it will be listed in the inventory without connection details"
        ));
    }
    let added = select_roles(&session, alias, roles)?;
    report(ctx, &session, alias, &format!("{added} role(s) selected"));
    session.finish()
}

pub fn deselect(ctx: &Context, alias: &str, roles: &[String]) -> Result<()> {
    let session = Session::open(ctx)?;
    let removed = deselect_roles(&session, alias, roles);
    report(ctx, &session, alias, &format!("{removed} role(s) deselected"));
    session.finish()
}

pub fn plan(ctx: &Context, alias: &str, role: &str, plan: Option<&str>) -> Result<()> {
    let session = Session::open(ctx)?;
    let changed = session
        .engine
        .edit_selection(|s| s.set_plan(alias, role, plan))?;
    if !ctx.quiet {
        match (changed, plan) {
            (false, _) => ui::info("Plan unchanged"),
            (true, Some(plan)) => ui::success(&format!("{alias}/{role} uses plan {plan}")),
            (true, None) => ui::success(&format!("Cleared plan of {alias}/{role}")),
        }
    }
    session.finish()
}

/// Select every role, returning how many were newly selected
pub(crate) fn select_roles(session: &Session, alias: &str, roles: &[String]) -> Result<usize> {
    let added = session.engine.edit_selection(|selection| {
        roles.iter().try_fold(0, |count, role| {
            Ok::<_, reconcile::Error>(count + usize::from(selection.select_role(alias, role)?))
        })
    })?;
    Ok(added)
}

pub(crate) fn deselect_roles(session: &Session, alias: &str, roles: &[String]) -> usize {
    session.engine.edit_selection(|selection| {
        roles
            .iter()
            .filter(|role| selection.deselect_role(alias, role))
            .count()
    })
}

fn report(ctx: &Context, session: &Session, alias: &str, summary: &str) {
    if ctx.quiet {
        return;
    }
    let selection = session.engine.selection();
    let roles = selection
        .roles_of(alias)
        .map_or_else(|| "(not selected)".to_string(), ui::roles);
    ui::success(&format!("{alias}: {summary}"));
    ui::kv("Roles", &roles);
}
