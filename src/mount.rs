//! Volume lifecycle management
//!
//! [`VolumeManager`] owns the resource table and is the only thing that
//! mutates it. Every mutation is applied to a copy, written to the state
//! store, and only then swapped in, so the in-memory table never runs ahead
//! of what is on disk.
//!
//! Mount, Unmount and Remove additionally hold a per-mountpoint latch for
//! their whole duration. That keeps the decision to establish or tear down a
//! physical mount, the helper call itself, and the counter update together,
//! while volumes on other mountpoints proceed independently.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::{Config, DriverConfig};
use crate::error::{Result, VolumeError};
use crate::invoker::{MountInvoker, SshfsInvoker};
use crate::store::StateStore;
use crate::volume::{ConnectionParams, MountState, VolumeInfo, VolumeRecord, VolumeTable};

/// Visibility of the volumes this driver manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Volumes exist only on this host
    Local,
    /// Volumes are visible cluster-wide
    Global,
}

/// Static driver capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub scope: Scope,
}

/// Lifecycle manager - owns the volume table and drives the mount helper
pub struct VolumeManager {
    /// Directory under which mountpoints are derived
    volumes_dir: PathBuf,
    /// Durable snapshot of `table`
    store: StateStore,
    /// Physical mount helper
    invoker: Arc<dyn MountInvoker>,
    /// All volumes, keyed by name
    table: RwLock<VolumeTable>,
    /// One latch per mountpoint; never pruned, bounded by distinct endpoints
    latches: DashMap<PathBuf, Arc<AsyncMutex<()>>>,
}

impl VolumeManager {
    /// Load persisted state and build a manager around `invoker`.
    ///
    /// Counters are restored as last written, even if the physical mounts
    /// did not survive the restart.
    pub fn open(driver: &DriverConfig, invoker: Arc<dyn MountInvoker>) -> Result<Self> {
        let volumes_dir = driver.volumes_dir();
        let store = StateStore::new(driver.state_path());

        let table = store.load()?;
        table.validate(&volumes_dir)?;

        let active = table
            .iter()
            .filter(|r| r.state() == MountState::Active)
            .count();
        info!(
            "Loaded {} volume(s) from {:?} ({} active)",
            table.len(),
            store.path(),
            active
        );
        if active > 0 {
            warn!(
                "{} volume(s) were in use at last shutdown; their mounts are not re-verified",
                active
            );
        }

        Ok(Self {
            volumes_dir,
            store,
            invoker,
            table: RwLock::new(table),
            latches: DashMap::new(),
        })
    }

    /// Build a manager that mounts through sshfs as configured
    pub fn from_config(config: &Config) -> Result<Self> {
        let invoker = Arc::new(SshfsInvoker::new(config.sshfs.clone()));
        Self::open(&config.driver, invoker)
    }

    pub fn volumes_dir(&self) -> &Path {
        &self.volumes_dir
    }

    /// Declare a volume. Nothing is mounted until the first `mount`.
    pub fn create(&self, name: &str, options: &BTreeMap<String, String>) -> Result<()> {
        validate_name(name)?;
        let params = ConnectionParams::from_options(options)?;
        let record = VolumeRecord::new(name, params, &self.volumes_dir);

        if let Some(other) = self
            .table
            .read()
            .sharing_mountpoint(name, record.mountpoint())
            .next()
        {
            debug!(
                "Volume {} shares mountpoint {:?} with {}",
                name,
                record.mountpoint(),
                other.name()
            );
        }

        let mountpoint = record.mountpoint().to_path_buf();
        self.commit(|table| table.insert(record))?;

        info!("Created volume {} at {:?}", name, mountpoint);
        Ok(())
    }

    /// Acquire the volume for `consumer_id` and return its mountpoint.
    ///
    /// The first consumer triggers the physical mount. If that fails the
    /// counter is left untouched so the call can simply be retried.
    pub async fn mount(&self, name: &str, consumer_id: &str) -> Result<PathBuf> {
        let (_latch, record) = self.lock_volume(name).await?;
        let mountpoint = record.mountpoint().to_path_buf();

        let establish = record.state() == MountState::Idle
            && !self.table.read().mountpoint_held_by_other(name, &mountpoint);

        tokio::fs::create_dir_all(&mountpoint).await?;

        if establish {
            self.invoker
                .establish(&mountpoint, record.params())
                .await
                .map_err(|source| VolumeError::Establish {
                    name: name.to_string(),
                    source,
                })?;
        } else {
            debug!("Volume {} already mounted at {:?}", name, mountpoint);
        }

        match self.commit(|table| Ok(table.lookup_mut(name)?.acquire())) {
            Ok(count) => {
                info!(
                    "Mounted volume {} for {} ({} consumer(s))",
                    name, consumer_id, count
                );
                Ok(mountpoint)
            }
            Err(e) => {
                if establish {
                    // Nobody will ever release a mount we failed to record
                    if let Err(undo) = self.invoker.teardown(&mountpoint).await {
                        warn!(
                            "Failed to roll back mount of {} at {:?}: {}",
                            name, mountpoint, undo
                        );
                    }
                }
                Err(e)
            }
        }
    }

    /// Release the volume for `consumer_id`.
    ///
    /// The last consumer triggers the physical unmount. The release stands
    /// even if that unmount fails; the error is still returned.
    pub async fn unmount(&self, name: &str, consumer_id: &str) -> Result<()> {
        let (_latch, record) = self.lock_volume(name).await?;
        let mountpoint = record.mountpoint();

        let remaining = self.commit(|table| {
            table
                .lookup_mut(name)?
                .release()
                .ok_or_else(|| VolumeError::NotMounted(name.to_string()))
        })?;

        info!(
            "Unmounted volume {} for {} ({} consumer(s) left)",
            name, consumer_id, remaining
        );
        if remaining > 0 {
            return Ok(());
        }

        if self.table.read().mountpoint_held_by_other(name, mountpoint) {
            info!(
                "Leaving {:?} mounted; another volume still uses it",
                mountpoint
            );
            return Ok(());
        }

        self.invoker
            .teardown(mountpoint)
            .await
            .map_err(|source| VolumeError::Teardown {
                name: name.to_string(),
                source,
            })
    }

    /// Forget an idle volume and clean up its mountpoint directory.
    ///
    /// A directory that cannot be removed does not keep the volume alive;
    /// the record is dropped and the cleanup failure is returned.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let (_latch, record) = self.lock_volume(name).await?;
        if record.reference_count() > 0 {
            return Err(VolumeError::InUse {
                name: name.to_string(),
                connections: record.reference_count(),
            });
        }

        let mountpoint = record.mountpoint();
        let shared = self
            .table
            .read()
            .sharing_mountpoint(name, mountpoint)
            .next()
            .is_some();
        let cleanup = if shared {
            debug!("Keeping {:?}; another volume uses it", mountpoint);
            None
        } else {
            remove_mountpoint_dir(mountpoint).err()
        };

        self.commit(|table| table.remove(name).map(|_| ()))?;
        info!("Removed volume {}", name);

        match cleanup {
            Some(source) => {
                warn!("Failed to remove mountpoint {:?}: {}", mountpoint, source);
                Err(VolumeError::Cleanup {
                    name: name.to_string(),
                    path: mountpoint.to_path_buf(),
                    source,
                })
            }
            None => Ok(()),
        }
    }

    pub fn path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.table.read().lookup(name)?.mountpoint().to_path_buf())
    }

    pub fn get(&self, name: &str) -> Result<VolumeInfo> {
        Ok(self.table.read().lookup(name)?.info())
    }

    pub fn list(&self) -> Vec<VolumeInfo> {
        self.table.read().iter().map(VolumeRecord::info).collect()
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            scope: Scope::Local,
        }
    }

    /// Copy of the whole table, credentials included
    pub fn snapshot(&self) -> VolumeTable {
        self.table.read().clone()
    }

    /// Apply `mutate` to a copy of the table, persist the copy, then install
    /// it. On any error the live table is untouched.
    fn commit<T>(&self, mutate: impl FnOnce(&mut VolumeTable) -> Result<T>) -> Result<T> {
        let mut table = self.table.write();
        let mut next = table.clone();
        let out = mutate(&mut next)?;
        self.store.save(&next)?;
        *table = next;
        Ok(out)
    }

    fn latch(&self, mountpoint: &Path) -> Arc<AsyncMutex<()>> {
        self.latches
            .entry(mountpoint.to_path_buf())
            .or_default()
            .clone()
    }

    /// Take the latch guarding `name`'s mountpoint and return the record as
    /// it stands under that latch.
    async fn lock_volume(&self, name: &str) -> Result<(OwnedMutexGuard<()>, VolumeRecord)> {
        loop {
            let mountpoint = self.table.read().lookup(name)?.mountpoint().to_path_buf();
            let guard = self.latch(&mountpoint).lock_owned().await;

            let record = self.table.read().lookup(name)?.clone();
            if record.mountpoint() == mountpoint {
                return Ok((guard, record));
            }
            // Removed and recreated for another endpoint while we waited
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() || name.contains('/') || name.contains('\0') {
        return Err(VolumeError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn remove_mountpoint_dir(path: &Path) -> io::Result<()> {
    match std::fs::remove_dir(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
