use anyhow::{Result, bail};

use crate::config::Config;
use crate::ui;

/// Print the effective configuration
pub fn show() -> Result<()> {
    let path = Config::path()?;
    let config = Config::load()?;

    ui::header("Configuration");
    let source = if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not created, showing defaults)", path.display())
    };
    ui::kv("File", &source);
    println!();
    print!("{}", config.to_toml()?);
    Ok(())
}

pub fn path() -> Result<()> {
    println!("{}", Config::path()?.display());
    Ok(())
}

/// Write a default config file
pub fn init(force: bool) -> Result<()> {
    let path = Config::path()?;
    if path.exists() && !force {
        bail!(
            "{} already exists. Use --force to overwrite.",
            path.display()
        );
    }

    Config::default().save_to(&path)?;
    ui::success(&format!("Wrote {}", path.display()));
    ui::dim("Set workspace.default, or pass --workspace on each command.");
    Ok(())
}
