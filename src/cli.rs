//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Keep filter-list subscriptions fresh.
///
/// Listsync tracks a set of remotely hosted filter lists, refreshes each one
/// when it expires and backs off when a server keeps failing.
#[derive(Parser, Debug)]
#[command(name = "listsync")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/listsync/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Subscription database
    #[arg(long, global = true, default_value = "listsync.db")]
    pub db: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Subscribe to a filter list
    Add {
        /// List URL
        url: String,

        /// Display title (defaults to the URL until the list declares one)
        #[arg(long)]
        title: Option<String>,
    },

    /// Unsubscribe from a filter list; its record is kept
    Remove {
        /// List URL
        url: String,
    },

    /// Show subscriptions and their refresh state
    List,

    /// Download subscriptions now and wait for the result
    Update {
        /// Only this subscription (default: every listed subscription)
        url: Option<String>,
    },

    /// Run the refresh scheduler until interrupted (Ctrl-C)
    Run,
}
