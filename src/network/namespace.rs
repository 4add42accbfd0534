//! Network namespace management
//!
//! A namespace carries an ordered roster of device entries taken from its
//! configuration. Attaching a veth end configures the first roster entry
//! whose name is a prefix of the end's name.

use crate::error::{Error, Result};
use crate::manifest::{DeviceConfig, NamespaceConfig};
use crate::network::command::{IpCommand, Runner};
use crate::network::veth::Veth;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use tracing::info;

/// A roster entry and whether an end has been attached for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredDevice {
    pub device: DeviceConfig,
    pub configured: bool,
}

/// A network namespace created on the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
    pub active: bool,
    pub devices: Vec<RegisteredDevice>,
}

impl Namespace {
    /// Create the namespace on the host with an unconfigured roster
    pub fn init(config: &NamespaceConfig, runner: &Runner) -> Result<Self> {
        let mut ns = Self {
            name: config.name.clone(),
            active: false,
            devices: config
                .devices
                .iter()
                .map(|d| RegisteredDevice {
                    device: d.clone(),
                    configured: false,
                })
                .collect(),
        };

        runner.run(IpCommand::NetnsAdd {
            name: ns.name.clone(),
        })?;

        ns.active = true;
        info!(ns = %ns.name, "created namespace");
        Ok(ns)
    }

    /// Delete the namespace from the host
    pub fn destroy(&mut self, runner: &Runner) -> Result<()> {
        if !self.active {
            return Err(Error::NamespaceInactive(self.name.clone()));
        }

        runner.run(IpCommand::NetnsDelete {
            name: self.name.clone(),
        })?;

        self.active = false;
        info!(ns = %self.name, "deleted namespace");
        Ok(())
    }

    /// Move a veth end into this namespace and address it
    ///
    /// Only the first roster entry whose name prefixes the end's name is
    /// considered. An end that matches no entry is left alone and `Ok(())`
    /// is returned with nothing changed.
    pub fn attach(&mut self, veth: &mut Veth, runner: &Runner) -> Result<()> {
        if veth.attached {
            return Err(Error::DeviceAttached(veth.name.clone()));
        }

        let Some(entry) = self
            .devices
            .iter_mut()
            .find(|d| veth.name.starts_with(&d.device.name))
        else {
            return Ok(());
        };

        if entry.configured {
            return Err(Error::DeviceConfigured {
                device: entry.device.name.clone(),
                namespace: self.name.clone(),
            });
        }

        let cidr = &entry.device.subnet;
        cidr.parse::<IpNet>().map_err(|e| Error::InvalidSubnet {
            cidr: cidr.clone(),
            namespace: self.name.clone(),
            device: entry.device.name.clone(),
            source: e,
        })?;

        let attach_err = |e: Error| Error::Attach {
            device: veth.name.clone(),
            namespace: self.name.clone(),
            source: Box::new(e),
        };

        runner
            .run(IpCommand::LinkSetNetns {
                device: veth.name.clone(),
                namespace: self.name.clone(),
            })
            .map_err(attach_err)?;

        runner
            .run(IpCommand::AddrAdd {
                namespace: self.name.clone(),
                device: veth.name.clone(),
                cidr: cidr.clone(),
            })
            .map_err(attach_err)?;

        runner
            .run(IpCommand::LinkUp {
                namespace: Some(self.name.clone()),
                device: veth.name.clone(),
            })
            .map_err(attach_err)?;

        info!(cidr = %cidr, device = %veth.name, ns = %self.name, "attached device");

        entry.configured = true;
        veth.attached = true;
        Ok(())
    }
}

/// Create every namespace, stopping at the first failure
///
/// Namespaces created before the failure are handed back alongside the
/// error so the caller can roll them back.
pub fn init_namespaces(
    configs: &[NamespaceConfig],
    runner: &Runner,
) -> std::result::Result<Vec<Namespace>, (Vec<Namespace>, Error)> {
    let mut namespaces = Vec::with_capacity(configs.len());

    for config in configs {
        match Namespace::init(config, runner) {
            Ok(ns) => namespaces.push(ns),
            Err(e) => return Err((namespaces, e)),
        }
    }

    Ok(namespaces)
}

/// Destroy every namespace, collecting all failures
pub fn cleanup_namespaces(namespaces: &mut [Namespace], runner: &Runner) -> Result<()> {
    let errors: Vec<Error> = namespaces
        .iter_mut()
        .filter_map(|ns| ns.destroy(runner).err())
        .collect();

    match Error::aggregate(errors) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
