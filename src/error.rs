//! Unified error types for Netloom

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Netloom operations
#[derive(Error, Debug)]
pub enum Error {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Config errors
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config validation failed: {0}")]
    ConfigValidation(String),

    #[error("Link '{link}' has mode '{mode}', expected '{expected}'")]
    InvalidLinkMode {
        link: String,
        mode: String,
        expected: String,
    },

    // State errors
    #[error("no saved state")]
    NoSavedState,

    #[error("A topology is already active, delete it first")]
    StateExists,

    #[error("Failed to (de)serialize state: {0}")]
    StateFormat(#[from] serde_json::Error),

    #[error("Failed to create state directory '{path}': {source}")]
    StateDir { path: PathBuf, source: io::Error },

    #[error("HOME is not set, pass --state-dir")]
    NoHomeDir,

    // Link lifecycle errors
    #[error("{0} is already created")]
    AlreadyCreated(String),

    #[error("{0} doesn't exist")]
    NotExist(String),

    #[error("{0} has been already busy")]
    LinkBusy(String),

    #[error("{0} is not busy")]
    LinkNotBusy(String),

    // Namespace errors
    #[error("Namespace '{0}' is already inactive")]
    NamespaceInactive(String),

    #[error("Device {0} is already attached")]
    DeviceAttached(String),

    #[error("Device {device} has been attached to namespace {namespace}")]
    DeviceConfigured { device: String, namespace: String },

    #[error("Failed to parse CIDR {cidr} in namespace {namespace} device {device}: {source}")]
    InvalidSubnet {
        cidr: String,
        namespace: String,
        device: String,
        source: ipnet::AddrParseError,
    },

    #[error("Failed to attach {device} to namespace {namespace}: {source}")]
    Attach {
        device: String,
        namespace: String,
        #[source]
        source: Box<Error>,
    },

    // Topology errors
    #[error("{link} has only 1 link in {namespace}")]
    SingleEndpoint { link: String, namespace: String },

    #[error("{link} has {degree} links despite it is not supported")]
    FanOut { link: String, degree: usize },

    #[error("Can't find device {0} in configured links")]
    UnknownLink(String),

    #[error("Link {0} is not used by any namespace")]
    UnusedLink(String),

    #[error("Failed to create links {link}: {source}")]
    Wire {
        link: String,
        #[source]
        source: Box<Error>,
    },

    // Command errors
    #[error("Command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    // Batch errors
    #[error("{0}")]
    Aggregate(Failures),

    #[error("{source} (rollback also failed: {rollback})")]
    Rollback {
        #[source]
        source: Box<Error>,
        rollback: Failures,
    },
}

impl Error {
    /// Fold a list of failures into a single error, `None` when the list is empty
    pub fn aggregate(errors: Vec<Error>) -> Option<Error> {
        match errors.len() {
            0 => None,
            1 => errors.into_iter().next(),
            _ => Some(Error::Aggregate(Failures(errors))),
        }
    }
}

/// A list of failures collected by a batch operation
#[derive(Debug)]
pub struct Failures(pub Vec<Error>);

impl Failures {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Failures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s) occurred: ", self.len())?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

/// Result type alias for Netloom operations
pub type Result<T> = std::result::Result<T, Error>;
