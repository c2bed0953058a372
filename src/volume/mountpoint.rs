//! Content-addressed mountpoint identity

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Compute the mountpoint for a connection endpoint.
///
/// The directory name is the hex SHA-256 of the connection string and, when
/// set, the port. Credentials and extra options do not take part: they change
/// how the endpoint is reached, not which endpoint it is.
pub fn mountpoint_for(volumes_dir: &Path, connection: &str, port: Option<u16>) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(connection.as_bytes());
    if let Some(port) = port {
        // separator between connection and port
        hasher.update([0u8]);
        hasher.update(port.to_be_bytes());
    }
    volumes_dir.join(format!("{:x}", hasher.finalize()))
}
