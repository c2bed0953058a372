use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::invoker::InvokerError;

/// Main error type for volume lifecycle operations
#[derive(Error, Debug)]
pub enum VolumeError {
    #[error("unknown volume: {0}")]
    UnknownVolume(String),

    #[error("volume already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid volume name: {0:?}")]
    InvalidName(String),

    #[error("missing required option: {0}")]
    MissingOption(&'static str),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("volume {name} is in use by {connections} consumer(s)")]
    InUse { name: String, connections: u32 },

    #[error("volume {0} is not mounted")]
    NotMounted(String),

    #[error("failed to mount volume {name}: {source}")]
    Establish {
        name: String,
        #[source]
        source: InvokerError,
    },

    #[error("failed to unmount volume {name}: {source}")]
    Teardown {
        name: String,
        #[source]
        source: InvokerError,
    },

    #[error("volume {name} removed but mountpoint {path:?} was not cleaned up: {source}")]
    Cleanup {
        name: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to persist volume state: {0}")]
    Persist(#[source] io::Error),

    #[error("corrupt volume state: {0}")]
    CorruptState(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Broad classification of a [`VolumeError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad request; the volume table was left unchanged
    Request,
    /// The mount helper failed
    External,
    /// The durable snapshot could not be read or written
    Persistence,
    /// Local filesystem trouble outside the state file
    Internal,
}

impl VolumeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VolumeError::UnknownVolume(_)
            | VolumeError::AlreadyExists(_)
            | VolumeError::InvalidName(_)
            | VolumeError::MissingOption(_)
            | VolumeError::InvalidOption(_)
            | VolumeError::InUse { .. }
            | VolumeError::NotMounted(_) => ErrorKind::Request,
            VolumeError::Establish { .. } | VolumeError::Teardown { .. } => ErrorKind::External,
            VolumeError::Persist(_) | VolumeError::CorruptState(_) => ErrorKind::Persistence,
            VolumeError::Cleanup { .. } | VolumeError::Io(_) => ErrorKind::Internal,
        }
    }
}

/// Result type alias for volume operations
pub type Result<T> = std::result::Result<T, VolumeError>;
