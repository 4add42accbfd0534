//! Netloom - virtual network topology builder
//!
//! Builds multi-namespace topologies on a single host from a TOML
//! description, remembers what it built, and tears it down again.

mod cli;
mod error;
mod manifest;
mod network;
mod state;

use cli::{Cli, Commands};
use error::Result;
use network::link::init_links;
use network::namespace::init_namespaces;
use network::topology::{self, Wiring};
use network::{Bridge, DirectLink, HostExecutor, Runner};
use state::{State, StateStore};
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    let host = HostExecutor;
    let runner = Runner::new(&host, cli.dry_run);

    match cli.command {
        Commands::Create { config } => {
            let config = manifest::load(&config)?;
            let store = state_store(cli.state_dir.as_deref())?;
            let existing = store.load_optional()?;

            let state = State::build(&config, existing.as_ref(), &runner)?;

            if cli.dry_run {
                info!("dry run, state not saved");
            } else {
                store.save(&state)?;
            }

            println!(
                "Created {} namespace(s), {} direct link(s), {} bridge(s)",
                state.namespaces.len(),
                state.direct_links.len(),
                state.bridges.len()
            );
        }

        Commands::Delete => {
            let store = state_store(cli.state_dir.as_deref())?;
            let mut state = store.load()?;
            state.dispose(&runner, &store)?;
            println!("Deleted topology");
        }

        Commands::Dump => {
            let store = state_store(cli.state_dir.as_deref())?;
            let state = store.load()?;
            println!("{}", state.dump()?);
        }

        Commands::Check { config } => {
            let config = manifest::load(&config)?;
            check(&config)?;
        }

        Commands::Completion { shell } => {
            Cli::generate_completion(shell);
        }
    }

    Ok(())
}

fn state_store(dir: Option<&Path>) -> Result<StateStore> {
    match dir {
        Some(dir) => Ok(StateStore::new(dir)),
        None => StateStore::default_location(),
    }
}

/// Resolve the wiring of a topology without touching the host
fn check(config: &manifest::TopologyConfig) -> Result<()> {
    let host = HostExecutor;
    let dry = Runner::new(&host, true);

    let direct_links: Vec<DirectLink> = init_links(&config.links, &dry);
    let bridges: Vec<Bridge> = init_links(&config.links, &dry);
    let namespaces = init_namespaces(&config.namespaces, &dry).map_err(|(_, e)| e)?;

    let plan = topology::plan(&namespaces, &direct_links, &bridges)?;

    println!("Configuration is valid.\n");
    println!("Wiring plan:");
    for wiring in &plan {
        match wiring {
            Wiring::Direct { link, left, right } => {
                println!(
                    "  {:<16} direct  {} <-> {}",
                    link, namespaces[*left].name, namespaces[*right].name
                );
            }
            Wiring::Bridge { link, targets } => {
                let members: Vec<&str> = targets
                    .iter()
                    .map(|idx| namespaces[*idx].name.as_str())
                    .collect();
                println!("  {:<16} bridge  {}", link, members.join(", "));
            }
        }
    }

    Ok(())
}
