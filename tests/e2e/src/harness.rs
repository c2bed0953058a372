//! Test harness for e2e tests
//!
//! Each [`TestHarness`] owns a temporary base directory, a scripted mount
//! helper and a [`VolumeManager`] opened on that directory. `restart()`
//! drops the manager and reopens it from the state file, which is how
//! crash-recovery scenarios are exercised.

use anyhow::{Context, Result};
use sshfs_volume::config::{DriverConfig, SshfsConfig};
use sshfs_volume::invoker::{MountInvoker, ScriptedInvoker, SshfsInvoker};
use sshfs_volume::{VolumeManager, VolumePlugin};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Initialize logging for tests (call once per test run)
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

/// Volume name that will not collide with other tests
pub fn unique_name(prefix: &str) -> String {
    format!("{}-{}", prefix, &Uuid::new_v4().to_string()[..8])
}

/// Build a Create options map
pub fn opts(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub struct TestHarness {
    base: TempDir,
    invoker: Arc<ScriptedInvoker>,
    manager: Arc<VolumeManager>,
}

impl TestHarness {
    pub fn new() -> Result<Self> {
        Self::with_invoker(ScriptedInvoker::new())
    }

    pub fn with_invoker(invoker: ScriptedInvoker) -> Result<Self> {
        init_logging();
        let base = TempDir::new().context("Failed to create base dir")?;
        let invoker = Arc::new(invoker);
        let manager = open(base.path(), invoker.clone())?;
        info!("Test harness at {:?}", base.path());
        Ok(Self {
            base,
            invoker,
            manager: Arc::new(manager),
        })
    }

    pub fn manager(&self) -> &Arc<VolumeManager> {
        &self.manager
    }

    pub fn invoker(&self) -> &ScriptedInvoker {
        &self.invoker
    }

    pub fn plugin(&self) -> VolumePlugin {
        VolumePlugin::new(self.manager.clone())
    }

    pub fn base_dir(&self) -> &Path {
        self.base.path()
    }

    pub fn driver(&self) -> DriverConfig {
        DriverConfig::new(self.base.path())
    }

    pub fn state_path(&self) -> PathBuf {
        self.driver().state_path()
    }

    /// Declare `name` pointing at `sshcmd` with no other options
    pub fn create(&self, name: &str, sshcmd: &str) -> Result<()> {
        self.manager.create(name, &opts(&[("sshcmd", sshcmd)]))?;
        Ok(())
    }

    /// Simulate a process restart: reload everything from the state file.
    ///
    /// The scripted helper is kept, as physical mounts would outlive the
    /// process.
    pub fn restart(&mut self) -> Result<()> {
        let manager = open(self.base.path(), self.invoker.clone())?;
        self.manager = Arc::new(manager);
        info!("Restarted manager from {:?}", self.state_path());
        Ok(())
    }
}

fn open(base: &Path, invoker: Arc<dyn MountInvoker>) -> Result<VolumeManager> {
    VolumeManager::open(&DriverConfig::new(base), invoker).context("Failed to open volume manager")
}

/// SSH server used by the gated integration tests
#[derive(Debug, Clone)]
pub struct IntegrationTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl IntegrationTarget {
    /// `None` unless `INTEGRATION_TESTS=1`
    pub fn from_env() -> Option<Self> {
        if env::var("INTEGRATION_TESTS").as_deref() != Ok("1") {
            return None;
        }
        Some(Self {
            host: env::var("SSH_TEST_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("SSH_TEST_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(2222),
            user: env::var("SSH_TEST_USER").unwrap_or_else(|_| "root".to_string()),
            password: env::var("SSH_TEST_PASSWORD").unwrap_or_else(|_| "root".to_string()),
        })
    }

    /// Create options reaching `remote_path` on this server
    pub fn create_opts(&self, remote_path: &str) -> BTreeMap<String, String> {
        let port = self.port.to_string();
        opts(&[
            ("sshcmd", &format!("{}@{}:{}", self.user, self.host, remote_path)),
            ("password", &self.password),
            ("port", &port),
        ])
    }

    /// Manager that really runs sshfs, rooted at `base`
    pub fn manager(&self, base: &Path) -> Result<VolumeManager> {
        let invoker = Arc::new(SshfsInvoker::new(SshfsConfig::default()));
        open(base, invoker)
    }
}
