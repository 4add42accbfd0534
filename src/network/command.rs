//! Host network commands
//!
//! Every change to the host's namespace and link tables goes through an
//! [`IpCommand`] issued by a [`Runner`]. The runner either hands the command
//! to an [`Executor`] or, in dry-run mode, only logs it.

use crate::error::{Error, Result};
use std::fmt;
use std::process::Command;
use tracing::{debug, info};

/// Path-less name of the iproute2 binary
pub const IP_CMD: &str = "ip";

/// A single host-level network operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpCommand {
    /// Create a veth pair with two named ends
    VethAdd { left: String, right: String },
    /// Delete a link (deleting either end of a veth pair removes both)
    LinkDelete { name: String },
    /// Create a named network namespace
    NetnsAdd { name: String },
    /// Delete a named network namespace
    NetnsDelete { name: String },
    /// Move a link into a namespace
    LinkSetNetns { device: String, namespace: String },
    /// Assign an address to a device inside a namespace
    AddrAdd {
        namespace: String,
        device: String,
        cidr: String,
    },
    /// Bring a device up, inside a namespace when one is given
    LinkUp {
        namespace: Option<String>,
        device: String,
    },
    /// Create a bridge device
    BridgeAdd { name: String },
    /// Enslave a device to a bridge
    LinkSetMaster { device: String, master: String },
}

impl IpCommand {
    /// Arguments passed to `ip`
    pub fn args(&self) -> Vec<&str> {
        match self {
            IpCommand::VethAdd { left, right } => vec![
                "link",
                "add",
                left.as_str(),
                "type",
                "veth",
                "peer",
                "name",
                right.as_str(),
            ],
            IpCommand::LinkDelete { name } => vec!["link", "delete", name.as_str()],
            IpCommand::NetnsAdd { name } => vec!["netns", "add", name.as_str()],
            IpCommand::NetnsDelete { name } => vec!["netns", "delete", name.as_str()],
            IpCommand::LinkSetNetns { device, namespace } => {
                vec!["link", "set", device.as_str(), "netns", namespace.as_str()]
            }
            IpCommand::AddrAdd {
                namespace,
                device,
                cidr,
            } => vec![
                "-n",
                namespace.as_str(),
                "addr",
                "add",
                cidr.as_str(),
                "dev",
                device.as_str(),
            ],
            IpCommand::LinkUp {
                namespace: Some(ns),
                device,
            } => vec!["-n", ns.as_str(), "link", "set", device.as_str(), "up"],
            IpCommand::LinkUp {
                namespace: None,
                device,
            } => vec!["link", "set", device.as_str(), "up"],
            IpCommand::BridgeAdd { name } => {
                vec!["link", "add", "name", name.as_str(), "type", "bridge"]
            }
            IpCommand::LinkSetMaster { device, master } => {
                vec!["link", "set", device.as_str(), "master", master.as_str()]
            }
        }
    }
}

impl fmt::Display for IpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", IP_CMD, self.args().join(" "))
    }
}

/// Something that can apply an [`IpCommand`] to the host
pub trait Executor {
    fn execute(&self, cmd: &IpCommand) -> Result<()>;
}

/// Executes commands by spawning iproute2
#[derive(Debug, Default, Clone, Copy)]
pub struct HostExecutor;

impl Executor for HostExecutor {
    fn execute(&self, cmd: &IpCommand) -> Result<()> {
        let output = Command::new(IP_CMD)
            .args(cmd.args())
            .output()
            .map_err(|e| Error::CommandFailed {
                command: cmd.to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::CommandFailed {
                command: cmd.to_string(),
                message: stderr.trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Issues commands through an executor, honouring dry-run
#[derive(Clone, Copy)]
pub struct Runner<'a> {
    executor: &'a dyn Executor,
    dry_run: bool,
}

impl<'a> Runner<'a> {
    pub fn new(executor: &'a dyn Executor, dry_run: bool) -> Self {
        Self { executor, dry_run }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Issue a command
    ///
    /// In dry-run mode the command is logged and reported as successful.
    pub fn run(&self, cmd: IpCommand) -> Result<()> {
        if self.dry_run {
            info!(command = %cmd, "dry run");
            return Ok(());
        }

        debug!(command = %cmd, "executing");
        self.executor.execute(&cmd)
    }
}

/// Test executor: records every command and fails on request
#[cfg(test)]
#[derive(Debug, Default)]
pub struct Recorder {
    issued: std::cell::RefCell<Vec<IpCommand>>,
    failing: std::cell::RefCell<Vec<IpCommand>>,
}

#[cfg(test)]
impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `cmd` fail every time it is issued
    pub fn fail_on(&self, cmd: IpCommand) {
        self.failing.borrow_mut().push(cmd);
    }

    /// Commands that reached the executor, in order
    pub fn issued(&self) -> Vec<IpCommand> {
        self.issued.borrow().clone()
    }

    pub fn count(&self, pred: impl Fn(&IpCommand) -> bool) -> usize {
        self.issued.borrow().iter().filter(|c| pred(c)).count()
    }

    pub fn clear(&self) {
        self.issued.borrow_mut().clear();
    }
}

#[cfg(test)]
impl Executor for Recorder {
    fn execute(&self, cmd: &IpCommand) -> Result<()> {
        self.issued.borrow_mut().push(cmd.clone());
        if self.failing.borrow().contains(cmd) {
            return Err(Error::CommandFailed {
                command: cmd.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}
