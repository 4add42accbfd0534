//! Topology description parsing for Netloom
//!
//! Parses `netloom.toml` topology files using serde

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

/// Load a topology description from a file
pub fn load(path: &Path) -> Result<TopologyConfig> {
    let content = fs::read_to_string(path).map_err(|e| Error::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config: TopologyConfig = toml::from_str(&content)?;
    config.validate()?;

    Ok(config)
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopologyConfig {
    /// Link definitions
    #[serde(default)]
    pub links: Vec<LinkConfig>,

    /// Namespace definitions
    #[serde(default)]
    pub namespaces: Vec<NamespaceConfig>,
}

impl TopologyConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let mut links = HashSet::new();
        for link in &self.links {
            if link.name.is_empty() {
                return Err(Error::ConfigValidation("Link with empty name".into()));
            }
            if !links.insert(&link.name) {
                return Err(Error::ConfigValidation(format!(
                    "Duplicate link name: {}",
                    link.name
                )));
            }
        }

        let mut namespaces = HashSet::new();
        for ns in &self.namespaces {
            if ns.name.is_empty() {
                return Err(Error::ConfigValidation("Namespace with empty name".into()));
            }
            if !namespaces.insert(&ns.name) {
                return Err(Error::ConfigValidation(format!(
                    "Duplicate namespace name: {}",
                    ns.name
                )));
            }

            // An empty prefix would match every endpoint name
            if ns.devices.iter().any(|d| d.name.is_empty()) {
                return Err(Error::ConfigValidation(format!(
                    "Namespace '{}' declares a device with an empty name",
                    ns.name
                )));
            }
        }

        // An unwired link can't be destroyed later
        for link in &self.links {
            let used = self
                .namespaces
                .iter()
                .flat_map(|ns| &ns.devices)
                .any(|d| d.name == link.name);
            if !used {
                return Err(Error::ConfigValidation(format!(
                    "Link '{}' is not used by any namespace",
                    link.name
                )));
            }
        }

        Ok(())
    }
}

/// How a link wires its namespaces together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkMode {
    /// Point-to-point veth pair between exactly two namespaces
    DirectLink,
    /// Host bridge with one veth port per namespace
    Bridge,
}

impl fmt::Display for LinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkMode::DirectLink => "direct_link",
            LinkMode::Bridge => "bridge",
        };
        write!(f, "{}", s)
    }
}

/// A link declaration
#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    /// Link name, referenced by namespace device entries
    pub name: String,
    /// Wiring mode
    pub mode: LinkMode,
}

#[cfg(test)]
impl LinkConfig {
    pub fn new(name: impl Into<String>, mode: LinkMode) -> Self {
        Self {
            name: name.into(),
            mode,
        }
    }
}

/// A namespace declaration
#[derive(Debug, Clone, Deserialize)]
pub struct NamespaceConfig {
    /// Namespace name (as passed to `ip netns add`)
    pub name: String,
    /// Devices to configure inside the namespace, in order
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

#[cfg(test)]
impl NamespaceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            devices: Vec::new(),
        }
    }

    pub fn device(mut self, name: impl Into<String>, subnet: impl Into<String>) -> Self {
        self.devices.push(DeviceConfig {
            name: name.into(),
            subnet: subnet.into(),
        });
        self
    }
}

/// A device entry inside a namespace
///
/// `name` doubles as the link name this device is wired to and as the prefix
/// matched against endpoint names on attach.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Device name prefix (the link name)
    pub name: String,
    /// Address with prefix length, e.g. "10.0.0.1/24"
    pub subnet: String,
}
