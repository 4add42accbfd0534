//! Virtual network primitives
//!
//! Provides:
//! - Host command execution with dry-run support
//! - Veth pairs and the direct links built from them
//! - Bridges for fan-out links
//! - Network namespaces and their device rosters
//! - Topology wiring between links and namespaces

pub mod bridge;
pub mod command;
pub mod direct_link;
pub mod link;
pub mod namespace;
pub mod topology;
pub mod veth;

pub use bridge::Bridge;
pub use command::{HostExecutor, Runner};
pub use direct_link::DirectLink;
pub use namespace::Namespace;
