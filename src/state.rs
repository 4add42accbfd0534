//! Persisted topology state
//!
//! A [`State`] is everything a build put on the host. It is written to a
//! single JSON file after a successful build and must be loaded and disposed
//! before another topology can be built.

use crate::error::{Error, Failures, Result};
use crate::manifest::TopologyConfig;
use crate::network::command::Runner;
use crate::network::link::{cleanup_links, discard_links, init_links};
use crate::network::namespace::{cleanup_namespaces, init_namespaces};
use crate::network::topology;
use crate::network::{Bridge, DirectLink, Namespace};
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// State file name inside the state directory
pub const STATE_FILE: &str = "state.json";

/// Directory under `$HOME` used when no state directory is given
pub const DEFAULT_STATE_DIR: &str = ".netloom";

/// All links and namespaces of the active topology
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub direct_links: Vec<DirectLink>,
    #[serde(default)]
    pub bridges: Vec<Bridge>,
    #[serde(default)]
    pub namespaces: Vec<Namespace>,
}

impl State {
    /// Build a topology from configuration
    ///
    /// Refuses to run while `existing` holds a previous topology. Links are
    /// created first (direct links, then bridges), then namespaces, then the
    /// links are wired. If namespaces or wiring fail, everything built so far
    /// is torn down and the original error is returned, carrying any rollback
    /// failures along with it.
    pub fn build(
        config: &TopologyConfig,
        existing: Option<&State>,
        runner: &Runner,
    ) -> Result<State> {
        if existing.is_some() {
            return Err(Error::StateExists);
        }

        let mut direct_links: Vec<DirectLink> = init_links(&config.links, runner);
        let mut bridges: Vec<Bridge> = init_links(&config.links, runner);

        let mut namespaces = match init_namespaces(&config.namespaces, runner) {
            Ok(namespaces) => namespaces,
            Err((mut built, e)) => {
                return Err(rollback(e, &mut direct_links, &mut bridges, &mut built, runner));
            }
        };

        if let Err(e) =
            topology::wire_all(&mut namespaces, &mut direct_links, &mut bridges, runner)
        {
            return Err(rollback(
                e,
                &mut direct_links,
                &mut bridges,
                &mut namespaces,
                runner,
            ));
        }

        info!(
            direct_links = direct_links.len(),
            bridges = bridges.len(),
            namespaces = namespaces.len(),
            "topology built"
        );

        Ok(State {
            direct_links,
            bridges,
            namespaces,
        })
    }

    /// Tear down every resource, then forget the saved state
    ///
    /// Direct links, bridges and namespaces are cleaned up in that order.
    /// Every member of a category is attempted, but the first category that
    /// reports an error stops the dispose. The state file is then rewritten
    /// with only what is still on the host, so a rerun picks up from there.
    pub fn dispose(&mut self, runner: &Runner, store: &StateStore) -> Result<()> {
        if let Err(e) = self.teardown(runner) {
            if !runner.is_dry_run() {
                self.forget_released();
                if let Err(save_err) = store.save(self) {
                    warn!(error = %save_err, "failed to record partial dispose");
                }
            }
            return Err(e);
        }

        if runner.is_dry_run() {
            info!(path = %store.path().display(), "dry run, keeping state file");
            return Ok(());
        }

        store.remove()
    }

    fn teardown(&mut self, runner: &Runner) -> Result<()> {
        cleanup_links(&mut self.direct_links, runner)?;
        cleanup_links(&mut self.bridges, runner)?;
        cleanup_namespaces(&mut self.namespaces, runner)
    }

    /// Drop everything that is already gone from the host
    fn forget_released(&mut self) {
        self.direct_links.retain(|l| l.veth_pair.active);
        self.bridges.retain(|b| b.active);
        self.namespaces.retain(|ns| ns.active);
    }

    /// Render the state as indented JSON
    pub fn dump(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Tear down a partial build, keeping `cause` as the primary error
fn rollback(
    cause: Error,
    direct_links: &mut [DirectLink],
    bridges: &mut [Bridge],
    namespaces: &mut [Namespace],
    runner: &Runner,
) -> Error {
    warn!(error = %cause, "build failed, rolling back");

    let mut failures = discard_links(direct_links, runner);
    failures.extend(discard_links(bridges, runner));
    failures.extend(
        namespaces
            .iter_mut()
            .filter(|ns| ns.active)
            .filter_map(|ns| ns.destroy(runner).err()),
    );

    if failures.is_empty() {
        cause
    } else {
        Error::Rollback {
            source: Box::new(cause),
            rollback: Failures(failures),
        }
    }
}

/// Location of the persisted state
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `$HOME/.netloom`
    pub fn default_location() -> Result<Self> {
        Self::under_home(std::env::var_os("HOME").as_deref())
    }

    fn under_home(home: Option<&OsStr>) -> Result<Self> {
        let home = home.ok_or(Error::NoHomeDir)?;
        Ok(Self::new(Path::new(home).join(DEFAULT_STATE_DIR)))
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    #[cfg(test)]
    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Read the saved state
    ///
    /// A missing file is reported as [`Error::NoSavedState`].
    pub fn load(&self) -> Result<State> {
        let content = match fs::read(self.path()) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(Error::NoSavedState),
            Err(e) => return Err(e.into()),
        };

        Ok(serde_json::from_slice(&content)?)
    }

    /// Read the saved state, `None` when there is none
    pub fn load_optional(&self) -> Result<Option<State>> {
        match self.load() {
            Ok(state) => Ok(Some(state)),
            Err(Error::NoSavedState) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write the state, replacing any previous file
    pub fn save(&self, state: &State) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| Error::StateDir {
            path: self.dir.clone(),
            source: e,
        })?;

        let content = serde_json::to_vec(state)?;
        let tmp = self.dir.join(format!("{}.tmp", STATE_FILE));
        fs::write(&tmp, content)?;
        fs::rename(&tmp, self.path())?;

        info!(path = %self.path().display(), "saved state");
        Ok(())
    }

    /// Delete the state file
    pub fn remove(&self) -> Result<()> {
        fs::remove_file(self.path())?;
        info!(path = %self.path().display(), "removed state");
        Ok(())
    }
}
