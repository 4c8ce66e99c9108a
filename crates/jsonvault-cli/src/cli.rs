use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "jsonvault",
    about = "Single-file JSON store with optional encryption at rest",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Data file to operate on (overrides the config file).
    #[arg(long, global = true, value_name = "PATH")]
    pub file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create the store (and crypto metadata) if it does not exist yet.
    Init,
    /// Print the value stored under a key.
    Get { key: String },
    /// Store a value; parsed as JSON, falling back to a plain string.
    Set { key: String, value: String },
    /// Remove a key.
    Delete { key: String },
    /// List keys in insertion order.
    Keys,
    /// Print the whole store as JSON.
    Dump,
    /// Re-encrypt the store under a new secret.
    Rekey {
        /// New secret; generated when omitted (requires a writable secret source).
        #[arg(long)]
        new_secret: Option<String>,
    },
    /// Print version and exit.
    Version,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}
