//! Bridge links
//!
//! A bridge is a host bridge device with one veth port per wired namespace.
//! Port `n` is the pair `<bridge>-<n>`: its left end is attached to the
//! namespace, its right end stays on the host enslaved to the bridge.

use crate::error::{Error, Failures, Result};
use crate::manifest::{LinkConfig, LinkMode};
use crate::network::command::{IpCommand, Runner};
use crate::network::link::{self, Link};
use crate::network::namespace::Namespace;
use crate::network::veth::VethPair;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A bridge device fanning out to any number of namespaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bridge {
    pub name: String,
    /// True while the bridge device exists on the host
    pub active: bool,
    /// Set once every target namespace has a port attached
    pub busy: bool,
    /// Port pairs in wiring order
    #[serde(default)]
    pub ports: Vec<VethPair>,
}

impl Bridge {
    /// Attach one port per entry of `targets`, in order
    ///
    /// A port that fails part way is kept in `ports` so a later destroy can
    /// still remove it; ports wired before the failure are left in place.
    pub fn wire(
        &mut self,
        namespaces: &mut [Namespace],
        targets: &[usize],
        runner: &Runner,
    ) -> Result<()> {
        if self.busy {
            return Err(Error::LinkBusy(self.name.clone()));
        }

        for &idx in targets {
            let port_name = format!("{}-{}", self.name, self.ports.len());
            let mut port = VethPair::new(port_name);
            port.create(runner)?;

            let result = self.plug(&mut port, &mut namespaces[idx], runner);
            self.ports.push(port);
            result?;
        }

        self.busy = true;
        info!(bridge = %self.name, ports = self.ports.len(), "wired bridge");
        Ok(())
    }

    fn plug(&self, port: &mut VethPair, ns: &mut Namespace, runner: &Runner) -> Result<()> {
        runner.run(IpCommand::LinkSetMaster {
            device: port.right.name.clone(),
            master: self.name.clone(),
        })?;
        runner.run(IpCommand::LinkUp {
            namespace: None,
            device: port.right.name.clone(),
        })?;

        ns.attach(&mut port.left, runner)
    }
}

impl Link for Bridge {
    const MODE: LinkMode = LinkMode::Bridge;

    fn init(config: &LinkConfig, runner: &Runner) -> Result<Self> {
        link::ensure_mode(config, Self::MODE)?;

        let mut bridge = Self {
            name: config.name.clone(),
            active: false,
            busy: false,
            ports: Vec::new(),
        };

        runner.run(IpCommand::BridgeAdd {
            name: bridge.name.clone(),
        })?;
        bridge.active = true;

        if let Err(e) = runner.run(IpCommand::LinkUp {
            namespace: None,
            device: bridge.name.clone(),
        }) {
            // Don't leave a half-configured bridge behind
            return Err(
                match runner.run(IpCommand::LinkDelete {
                    name: bridge.name.clone(),
                }) {
                    Ok(()) => e,
                    Err(cleanup) => Error::Rollback {
                        source: Box::new(e),
                        rollback: Failures(vec![cleanup]),
                    },
                },
            );
        }

        info!(bridge = %bridge.name, "created bridge");
        Ok(bridge)
    }

    /// Only a wired bridge can be destroyed
    fn destroy(&mut self, runner: &Runner) -> Result<()> {
        if !self.busy {
            return Err(Error::LinkNotBusy(self.name.clone()));
        }

        self.teardown(runner)
    }

    fn discard(&mut self, runner: &Runner) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        self.teardown(runner)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Bridge {
    fn teardown(&mut self, runner: &Runner) -> Result<()> {
        if !self.active {
            return Err(Error::NotExist(self.name.clone()));
        }

        for port in self.ports.iter_mut().filter(|p| p.active) {
            port.destroy(runner)?;
        }

        runner.run(IpCommand::LinkDelete {
            name: self.name.clone(),
        })?;

        self.active = false;
        info!(bridge = %self.name, "deleted bridge");
        Ok(())
    }
}
