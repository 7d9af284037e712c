mod cli;
mod commands;
mod config;
mod paths;
mod session;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command, ConfigCommand, HostCommand};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub workspace: Option<String>,
    pub offline: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        workspace: cli.workspace,
        offline: cli.offline,
    };

    match cli.command {
        Command::Status(args) => commands::status::run(&ctx, args.json),
        Command::Select { alias, roles } => commands::selection::select(&ctx, &alias, &roles),
        Command::Deselect { alias, roles } => commands::selection::deselect(&ctx, &alias, &roles),
        Command::Plan { alias, role, plan } => {
            commands::selection::plan(&ctx, &alias, &role, plan.as_deref())
        }
        Command::Sync(args) => commands::sync::sync(&ctx, args.dry_run),
        Command::Pull => commands::sync::pull(&ctx),
        Command::Watch(args) => commands::sync::watch(&ctx, args.interval, args.iterations),
        Command::Host(cmd) => match cmd {
            HostCommand::Add(args) => commands::host::add(&ctx, args),
            HostCommand::Set(args) => commands::host::set(&ctx, args),
            HostCommand::Show { alias, json } => commands::host::show(&ctx, &alias, json),
            HostCommand::List { json } => commands::host::list(&ctx, json),
        },
        Command::Rename { from, to } => commands::alias::rename(&ctx, &from, &to),
        Command::Delete { alias } => commands::alias::delete(&ctx, &alias),
        Command::Purge { alias, yes } => commands::alias::purge(&ctx, &alias, yes),
        Command::Orphans(args) => commands::orphans::run(&ctx, args),
        Command::Config(cmd) => match cmd {
            ConfigCommand::Show => commands::config::show(),
            ConfigCommand::Path => commands::config::path(),
            ConfigCommand::Init { force } => commands::config::init(force),
        },
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "hostsync", &mut io::stdout());
            Ok(())
        }
    }
}
