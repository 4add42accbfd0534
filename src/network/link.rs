//! Shared lifecycle for link kinds
//!
//! Direct links and bridges are built from the same configuration list and
//! torn down the same way, so batch creation and cleanup are written once
//! against [`Link`].

use crate::error::{Error, Result};
use crate::manifest::{LinkConfig, LinkMode};
use crate::network::command::Runner;
use tracing::{debug, error};

/// A link that can be created from configuration and destroyed
pub trait Link: Sized {
    /// The configuration mode this kind is built from
    const MODE: LinkMode;

    /// Create the link on the host
    fn init(config: &LinkConfig, runner: &Runner) -> Result<Self>;

    /// Remove the link from the host
    fn destroy(&mut self, runner: &Runner) -> Result<()>;

    /// Remove whatever this link still holds on the host, wired or not
    ///
    /// Used when rolling back a build that failed before wiring finished.
    fn discard(&mut self, runner: &Runner) -> Result<()>;

    fn name(&self) -> &str;
}

/// Check that `config` selects `expected`
pub fn ensure_mode(config: &LinkConfig, expected: LinkMode) -> Result<()> {
    if config.mode != expected {
        return Err(Error::InvalidLinkMode {
            link: config.name.clone(),
            mode: config.mode.to_string(),
            expected: expected.to_string(),
        });
    }
    Ok(())
}

/// Create every link of kind `L`
///
/// Entries of another mode are skipped. Entries that fail to initialise are
/// logged and skipped; only the links that were created are returned.
pub fn init_links<L: Link>(configs: &[LinkConfig], runner: &Runner) -> Vec<L> {
    let mut links = Vec::new();

    for config in configs {
        if config.mode != L::MODE {
            debug!(link = %config.name, mode = %config.mode, "skipping link of other mode");
            continue;
        }

        match L::init(config, runner) {
            Ok(link) => {
                debug!(link = %link.name(), mode = %L::MODE, "initialized link");
                links.push(link);
            }
            Err(e) => {
                error!(link = %config.name, error = %e, "failed to init link");
            }
        }
    }

    links
}

/// Discard every link, collecting all failures
pub fn discard_links<L: Link>(links: &mut [L], runner: &Runner) -> Vec<Error> {
    links
        .iter_mut()
        .filter_map(|link| link.discard(runner).err())
        .collect()
}

/// Destroy every link, collecting all failures
pub fn cleanup_links<L: Link>(links: &mut [L], runner: &Runner) -> Result<()> {
    let errors: Vec<Error> = links
        .iter_mut()
        .filter_map(|link| link.destroy(runner).err())
        .collect();

    match Error::aggregate(errors) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
