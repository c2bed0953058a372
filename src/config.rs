//! Configuration parsing and structures

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::env::substitute_env_vars;

/// Default directory holding mountpoints and the state file
pub const DEFAULT_BASE_DIR: &str = "/var/lib/sshfs-volume";
/// File name of the persisted volume table
pub const STATE_FILE_NAME: &str = "sshfs-state.json";

// =============================================================================
// Raw Config (Deserialized from YAML)
// =============================================================================

/// Raw configuration as deserialized from YAML.
/// This is converted to `Config` via `resolve()`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Driver directories
    #[serde(default)]
    pub driver: RawDriverConfig,

    /// Mount helper settings
    #[serde(default)]
    pub sshfs: RawSshfsConfig,
}

/// Driver section; every field falls back to a default
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawDriverConfig {
    /// Base directory for mountpoints and state
    pub base_dir: Option<PathBuf>,
}

/// sshfs section; every field falls back to a default
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawSshfsConfig {
    /// Mount command
    pub command: Option<String>,

    /// Unmount command
    pub unmount_command: Option<String>,

    /// Identity file used by volumes created without a credential
    pub identity_file: Option<PathBuf>,

    /// Verify the remote host key
    pub strict_host_key_checking: Option<bool>,

    /// Upper bound for a single mount or unmount invocation (e.g. "30s")
    #[serde(default)]
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,

    /// Options appended to every mount
    #[serde(default)]
    pub default_options: Vec<String>,
}

// =============================================================================
// Resolved Config (Ready for use)
// =============================================================================

/// Top-level configuration (resolved from RawConfig)
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Driver directories
    pub driver: DriverConfig,

    /// Mount helper settings
    pub sshfs: SshfsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Driver directories (resolved)
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Base directory; mountpoints live in `volumes/`, state in `state/`
    pub base_dir: PathBuf,
}

impl DriverConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Directory under which every mountpoint is created
    pub fn volumes_dir(&self) -> PathBuf {
        self.base_dir.join("volumes")
    }

    /// Location of the persisted volume table
    pub fn state_path(&self) -> PathBuf {
        self.base_dir.join("state").join(STATE_FILE_NAME)
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DIR)
    }
}

/// Mount helper configuration (resolved)
#[derive(Debug, Clone)]
pub struct SshfsConfig {
    pub command: String,
    pub unmount_command: String,
    pub identity_file: Option<PathBuf>,
    pub strict_host_key_checking: bool,
    pub timeout: Option<Duration>,
    pub default_options: Vec<String>,
}

impl Default for SshfsConfig {
    fn default() -> Self {
        Self {
            command: "sshfs".to_string(),
            unmount_command: "umount".to_string(),
            identity_file: None,
            strict_host_key_checking: false,
            timeout: None,
            default_options: Vec::new(),
        }
    }
}

// =============================================================================
// Resolution Logic
// =============================================================================

impl RawConfig {
    /// Resolve raw config into final config by filling in defaults
    pub fn resolve(self) -> Result<Config, ConfigError> {
        let RawConfig {
            logging,
            driver,
            sshfs,
        } = self;

        let defaults = SshfsConfig::default();

        Ok(Config {
            logging,
            driver: driver
                .base_dir
                .map(DriverConfig::new)
                .unwrap_or_default(),
            sshfs: SshfsConfig {
                command: sshfs.command.unwrap_or(defaults.command),
                unmount_command: sshfs.unmount_command.unwrap_or(defaults.unmount_command),
                identity_file: sshfs.identity_file,
                strict_host_key_checking: sshfs
                    .strict_host_key_checking
                    .unwrap_or(defaults.strict_host_key_checking),
                timeout: sshfs.timeout,
                default_options: sshfs.default_options,
            },
        })
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let content = substitute_env_vars(content)?;
        // An empty document is a valid, all-defaults configuration
        if content.trim().is_empty() {
            return RawConfig::default().resolve();
        }
        let raw: RawConfig =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        raw.resolve()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_dir = &self.driver.base_dir;
        if base_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "driver.base_dir cannot be empty".to_string(),
            ));
        }
        if !base_dir.is_absolute() {
            return Err(ConfigError::ValidationError(format!(
                "driver.base_dir must be absolute: {:?}",
                base_dir
            )));
        }

        if self.sshfs.command.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "sshfs.command cannot be empty".to_string(),
            ));
        }
        if self.sshfs.unmount_command.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "sshfs.unmount_command cannot be empty".to_string(),
            ));
        }

        if self.sshfs.timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ValidationError(
                "sshfs.timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}
