pub mod alias;
pub mod config;
pub mod host;
pub mod orphans;
pub mod selection;
pub mod status;
pub mod sync;

use anyhow::{Context as _, Result, bail};
use dialoguer::Confirm;

/// Ask for confirmation; refuses outright when there is no terminal to ask on
pub(crate) fn confirm(prompt: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    if !crate::ui::is_interactive() {
        bail!("Refusing to continue without a terminal; pass --yes to confirm");
    }
    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}
