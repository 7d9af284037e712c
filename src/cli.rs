use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "hostsync")]
#[command(version)]
#[command(
    about = "Keep host role selections, the Ansible inventory and host vars in sync",
    long_about = None
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Workspace to operate on (defaults to workspace.default in the config)
    #[arg(short, long, global = true, env = "HOSTSYNC_WORKSPACE")]
    pub workspace: Option<String>,

    /// Treat the file store as unreachable; changes stay local until the next online run
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show workspace, inventory and queue status
    Status(StatusArgs),

    /// Select roles for a host
    Select {
        /// Host alias
        alias: String,
        /// Roles to select
        #[arg(required = true)]
        roles: Vec<String>,
    },

    /// Deselect roles for a host
    Deselect {
        /// Host alias
        alias: String,
        /// Roles to deselect
        #[arg(required = true)]
        roles: Vec<String>,
    },

    /// Set or clear the plan of a selected role
    Plan {
        /// Host alias
        alias: String,
        /// Role id
        role: String,
        /// Plan name; omit to clear
        plan: Option<String>,
    },

    /// Reconcile the selection with the inventory file
    Sync(SyncArgs),

    /// Re-read the inventory and host vars into the local state
    Pull,

    /// Manage hosts
    #[command(subcommand)]
    Host(HostCommand),

    /// Rename a host and move its files
    Rename {
        /// Current alias
        from: String,
        /// New alias
        to: String,
    },

    /// Remove a host from the inventory, keeping its files
    Delete {
        /// Host alias
        alias: String,
    },

    /// Remove a host and delete its host vars and keys
    Purge {
        /// Host alias
        alias: String,
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Find host vars and keys whose host is not in the inventory
    Orphans(OrphansArgs),

    /// Keep reconciling until interrupted
    Watch(WatchArgs),

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct StatusArgs {
    /// Print machine-readable JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct SyncArgs {
    /// Show the inventory diff without writing
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct OrphansArgs {
    /// Delete the orphaned files
    #[arg(long)]
    pub delete: bool,

    /// Skip confirmation when deleting
    #[arg(short, long)]
    pub yes: bool,

    /// Print machine-readable JSON
    #[arg(long, conflicts_with = "delete")]
    pub json: bool,
}

#[derive(Args)]
pub struct WatchArgs {
    /// Poll interval in milliseconds (defaults to sync.poll_interval_ms)
    #[arg(long)]
    pub interval: Option<u64>,

    /// Stop after this many polls
    #[arg(long, hide = true)]
    pub iterations: Option<u64>,
}

// ============================================================================
// Host Commands
// ============================================================================

#[derive(Subcommand)]
pub enum HostCommand {
    /// Register a host and write its host vars
    Add(HostAddArgs),

    /// Change fields of a host
    Set(HostSetArgs),

    /// Show one host
    Show {
        /// Host alias
        alias: String,
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// List hosts with their roles
    List {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum AuthArg {
    Password,
    PrivateKey,
}

impl From<AuthArg> for reconcile::AuthMethod {
    fn from(auth: AuthArg) -> Self {
        match auth {
            AuthArg::Password => Self::Password,
            AuthArg::PrivateKey => Self::PrivateKey,
        }
    }
}

#[derive(Args)]
pub struct HostAddArgs {
    /// Host alias, used for file names and inventory entries
    pub alias: String,

    /// Hostname or IP address
    #[arg(long)]
    pub host: String,

    /// SSH user
    #[arg(long)]
    pub user: String,

    /// SSH port
    #[arg(long, default_value_t = reconcile::DEFAULT_PORT)]
    pub port: u16,

    /// Authentication method
    #[arg(long, value_enum, default_value = "password")]
    pub auth: AuthArg,

    /// Password or private key; prompted for when omitted on a terminal
    #[arg(long, env = "HOSTSYNC_HOST_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    #[command(flatten)]
    pub fields: HostFieldArgs,
}

#[derive(Args)]
pub struct HostSetArgs {
    /// Host alias
    pub alias: String,

    /// Hostname or IP address
    #[arg(long)]
    pub host: Option<String>,

    /// SSH user
    #[arg(long)]
    pub user: Option<String>,

    /// SSH port
    #[arg(long)]
    pub port: Option<u16>,

    #[command(flatten)]
    pub fields: HostFieldArgs,
}

/// Display fields mirrored into host vars
#[derive(Args, Default)]
pub struct HostFieldArgs {
    /// Accent color as #RRGGBB
    #[arg(long)]
    pub color: Option<String>,

    /// Logo file name
    #[arg(long)]
    pub logo: Option<String>,

    /// Free-form description
    #[arg(long)]
    pub description: Option<String>,

    /// Primary domain served by the host
    #[arg(long)]
    pub domain: Option<String>,
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Print the config file location
    Path,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_host_add() {
        let cli = Cli::try_parse_from([
            "hostsync", "-w", "prod", "host", "add", "web", "--host", "10.0.0.1", "--user",
            "root", "--auth", "private-key", "--color", "#00ff00",
        ])
        .unwrap();
        assert_eq!(cli.workspace.as_deref(), Some("prod"));
        let Command::Host(HostCommand::Add(args)) = cli.command else {
            panic!("expected host add");
        };
        assert_eq!(args.port, 22);
        assert!(matches!(args.auth, AuthArg::PrivateKey));
        assert_eq!(args.fields.color.as_deref(), Some("#00ff00"));
    }

    #[test]
    fn test_select_requires_roles() {
        assert!(Cli::try_parse_from(["hostsync", "select", "web"]).is_err());
        assert!(Cli::try_parse_from(["hostsync", "select", "web", "nginx", "redis"]).is_ok());
    }
}
