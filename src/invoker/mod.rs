//! Mount helper abstraction
//!
//! The lifecycle manager never mounts anything itself. It asks a
//! [`MountInvoker`] to establish the physical mount when a volume gains its
//! first consumer and to tear it down when the last one leaves.

pub mod scripted;
pub mod sshfs;

use std::io;
use std::path::Path;
use std::process::ExitStatus;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::volume::ConnectionParams;

pub use scripted::{InvokerCall, ScriptedInvoker};
pub use sshfs::SshfsInvoker;

/// Failure reported by a mount helper
#[derive(Error, Debug)]
pub enum InvokerError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("{command} exited with {status}: {output}")]
    Failed {
        command: String,
        status: ExitStatus,
        output: String,
    },

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("{0}")]
    Other(String),
}

/// Performs the physical mount and unmount of a volume.
///
/// Both calls may block for as long as the remote side takes. They should be
/// safe to retry after a failure.
#[async_trait]
pub trait MountInvoker: Send + Sync {
    /// Attach the remote endpoint described by `params` at `mountpoint`
    async fn establish(
        &self,
        mountpoint: &Path,
        params: &ConnectionParams,
    ) -> Result<(), InvokerError>;

    /// Detach whatever is mounted at `mountpoint`
    async fn teardown(&self, mountpoint: &Path) -> Result<(), InvokerError>;
}
