use std::path::PathBuf;

use cdnsync_kv::Namespace;
use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Tracks upstream releases and publishes them to the CDN metadata store",
    arg_required_else_help = true
)]
pub struct Args {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file to use instead of the default location
    #[arg(short, long, global = true, env = "CDNSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import and publish new upstream versions
    Sync {
        /// Only sync these packages
        #[arg(short, long = "package", value_name = "NAME")]
        packages: Vec<String>,

        /// Run against an in-memory store without audit or search updates
        #[arg(long)]
        dry_run: bool,
    },

    /// Drop a version from a package's aggregated metadata
    RemoveVersion {
        package: String,
        version: String,
    },

    /// Browse the KV store
    Kv {
        #[command(subcommand)]
        action: KvAction,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum KvAction {
    /// List the keys below a path
    #[clap(name = "ls")]
    List {
        namespace: Namespace,

        #[arg(default_value = "")]
        path: String,
    },

    /// Print a record and its metadata
    Get {
        namespace: Namespace,
        key: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write an annotated default configuration
    Init,

    /// Print the effective configuration
    Show,
}
