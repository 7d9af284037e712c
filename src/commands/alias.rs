use anyhow::{Result, bail};
use colored::Colorize;
use inventory::AliasPaths;
use reconcile::{DeleteRequest, Error, PurgeRequest, RenameRequest};

use crate::Context;
use crate::session::Session;
use crate::ui;

pub fn rename(ctx: &Context, from: &str, to: &str) -> Result<()> {
    let session = Session::open(ctx)?;
    let result = session
        .engine
        .rename_host(RenameRequest::new(from, to));
    finish(ctx, session, result, &format!("Renamed {from} to {to}"))
}

pub fn delete(ctx: &Context, alias: &str) -> Result<()> {
    let session = Session::open(ctx)?;
    let result = session.engine.delete_host(DeleteRequest {
        alias: alias.to_string(),
    });
    finish(
        ctx,
        session,
        result,
        &format!("Removed {alias} from the inventory; its files were kept"),
    )
}

pub fn purge(ctx: &Context, alias: &str, yes: bool) -> Result<()> {
    let session = Session::open(ctx)?;
    if session.engine.host(alias).is_none() && !session.engine.selection().contains_alias(alias)
    {
        bail!("Unknown host '{alias}'");
    }

    if !yes {
        println!("Purging {} deletes:", alias.cyan());
        for (_, path) in AliasPaths::for_alias(alias).entries() {
            println!("  {} {path}", "-".red());
        }
    }
    if !super::confirm(&format!("Purge {alias}?"), yes)? {
        ui::info("Cancelled");
        return Ok(());
    }

    let result = session.engine.purge_host(PurgeRequest {
        alias: alias.to_string(),
    });
    finish(ctx, session, result, &format!("Purged {alias}"))
}

/// Report a cascade and save. Validation failures abort without saving;
/// partial cascades are saved, then reported as an error.
fn finish(
    ctx: &Context,
    session: Session,
    result: reconcile::Result<()>,
    done: &str,
) -> Result<()> {
    match result {
        Ok(()) => {
            if !ctx.quiet {
                ui::success(done);
            }
            session.finish()
        }
        Err(e) if e.is_validation() || matches!(e, Error::UnknownAlias(_)) => Err(e.into()),
        Err(Error::Cascade {
            operation,
            alias,
            failures,
        }) => {
            session.finish()?;
            for failure in &failures {
                ui::error(failure);
            }
            bail!("{operation} of {alias} finished with {} failed step(s)", failures.len())
        }
        Err(e) => {
            session.finish()?;
            Err(e.into())
        }
    }
}
