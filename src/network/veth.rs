//! Veth pair management
//!
//! A veth pair is two virtual Ethernet ends created and destroyed as a unit.
//! Ends are moved into namespaces one at a time; once moved, an end is no
//! longer visible from the host.

use crate::error::{Error, Result};
use crate::network::command::{IpCommand, Runner};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One end of a veth pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Veth {
    /// Interface name
    pub name: String,
    /// Set once the end has been moved into a namespace, never cleared
    pub attached: bool,
}

impl Veth {
    fn new(name: String) -> Self {
        Self {
            name,
            attached: false,
        }
    }
}

/// A veth pair named `<name>-left` / `<name>-right`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VethPair {
    pub name: String,
    pub left: Veth,
    pub right: Veth,
    /// True between a successful create and the destroy that removed it
    pub active: bool,
}

impl VethPair {
    /// Build an inactive pair; nothing is issued to the host
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            left: Veth::new(format!("{}-left", name)),
            right: Veth::new(format!("{}-right", name)),
            name,
            active: false,
        }
    }

    fn label(&self) -> String {
        format!("{}@{}", self.left.name, self.right.name)
    }

    /// Create the pair on the host
    pub fn create(&mut self, runner: &Runner) -> Result<()> {
        if self.active {
            return Err(Error::AlreadyCreated(self.label()));
        }

        runner.run(IpCommand::VethAdd {
            left: self.left.name.clone(),
            right: self.right.name.clone(),
        })?;

        self.active = true;
        info!(pair = %self.label(), "created veth pair");
        Ok(())
    }

    /// Delete the pair from the host
    ///
    /// Deletes whichever end is still on the host, left first. When both ends
    /// have been moved into namespaces nothing is visible from the host and
    /// this is a successful no-op that leaves the pair active; the ends go
    /// away with their namespaces.
    pub fn destroy(&mut self, runner: &Runner) -> Result<()> {
        if !self.active {
            return Err(Error::NotExist(self.label()));
        }

        let resident = if !self.left.attached {
            &self.left
        } else if !self.right.attached {
            &self.right
        } else {
            info!(pair = %self.label(), "veth pair is invisible from host");
            return Ok(());
        };

        runner.run(IpCommand::LinkDelete {
            name: resident.name.clone(),
        })?;

        self.active = false;
        info!(pair = %self.label(), "deleted veth pair");
        Ok(())
    }
}
