//! Command-line interface for Netloom
//!
//! Uses clap with derive for type-safe CLI parsing

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Netloom - virtual network topologies from namespaces, veth pairs and bridges
#[derive(Parser)]
#[command(name = "netloom")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory holding the saved topology state (default: ~/.netloom)
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log the host commands instead of running them
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Build the topology described by a configuration file
    Create {
        /// Topology file path
        #[arg(short, long, default_value = "netloom.toml")]
        config: PathBuf,
    },

    /// Tear down the saved topology
    Delete,

    /// Print the saved topology as JSON
    Dump,

    /// Validate a configuration file and show how it would be wired
    Check {
        /// Topology file path
        #[arg(short, long, default_value = "netloom.toml")]
        config: PathBuf,
    },

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Generate shell completions
    pub fn generate_completion(shell: Shell) {
        let mut cmd = Self::command();
        clap_complete::generate(shell, &mut cmd, "netloom", &mut std::io::stdout());
    }
}
