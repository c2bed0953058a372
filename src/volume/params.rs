//! Connection parameters and Create option parsing

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VolumeError};

/// Option key carrying the connection string
pub const OPT_SSHCMD: &str = "sshcmd";
/// Option key carrying a password credential
pub const OPT_PASSWORD: &str = "password";
/// Option key carrying a private key path
pub const OPT_IDENTITY_FILE: &str = "identity_file";
/// Option key carrying the ssh port
pub const OPT_PORT: &str = "port";

/// Authentication material for a volume
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credential {
    /// Password fed to the mount helper on stdin
    Password(String),
    /// Private key file on the host
    IdentityFile(PathBuf),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Password(_) => f.write_str("Password(<redacted>)"),
            Credential::IdentityFile(path) => f.debug_tuple("IdentityFile").field(path).finish(),
        }
    }
}

/// Everything the mount helper needs to reach a remote endpoint.
///
/// Immutable once the owning volume is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Remote endpoint, e.g. `user@host:/path`
    pub connection: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<Credential>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Free-form mount options, `key` or `key=value`
    #[serde(default)]
    pub options: Vec<String>,
}

impl ConnectionParams {
    pub fn new(connection: impl Into<String>) -> Self {
        Self {
            connection: connection.into(),
            credential: None,
            port: None,
            options: Vec::new(),
        }
    }

    /// Parse the options map of a Create request.
    ///
    /// `sshcmd` is required. `password`, `identity_file` and `port` are
    /// lifted into typed fields; any other key becomes a mount option.
    pub fn from_options(opts: &BTreeMap<String, String>) -> Result<Self> {
        let connection = opts
            .get(OPT_SSHCMD)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or(VolumeError::MissingOption(OPT_SSHCMD))?;

        let credential = match (opts.get(OPT_PASSWORD), opts.get(OPT_IDENTITY_FILE)) {
            (Some(_), Some(_)) => {
                return Err(VolumeError::InvalidOption(format!(
                    "{} and {} are mutually exclusive",
                    OPT_PASSWORD, OPT_IDENTITY_FILE
                )))
            }
            (Some(password), None) if !password.is_empty() => {
                Some(Credential::Password(password.clone()))
            }
            (None, Some(path)) if !path.is_empty() => {
                Some(Credential::IdentityFile(PathBuf::from(path)))
            }
            _ => None,
        };

        let port = match opts.get(OPT_PORT).map(|s| s.trim()) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<u16>().ok().filter(|p| *p != 0).ok_or_else(|| {
                VolumeError::InvalidOption(format!("{}={} is not a valid port", OPT_PORT, raw))
            })?),
        };

        let options = opts
            .iter()
            .filter(|(key, _)| {
                !matches!(
                    key.as_str(),
                    OPT_SSHCMD | OPT_PASSWORD | OPT_IDENTITY_FILE | OPT_PORT
                )
            })
            .map(|(key, value)| {
                if value.is_empty() {
                    key.clone()
                } else {
                    format!("{}={}", key, value)
                }
            })
            .collect();

        Ok(Self {
            connection: connection.to_string(),
            credential,
            port,
            options,
        })
    }
}
