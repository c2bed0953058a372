use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::mountpoint::mountpoint_for;
use super::params::ConnectionParams;

/// Observable mount state of a volume, derived from its reference count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountState {
    /// No consumer holds the volume
    Idle,
    /// At least one consumer holds the volume
    Active,
}

impl fmt::Display for MountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountState::Idle => f.write_str("idle"),
            MountState::Active => f.write_str("active"),
        }
    }
}

/// A named volume as held in the resource table and persisted to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRecord {
    name: String,
    #[serde(flatten)]
    params: ConnectionParams,
    mountpoint: PathBuf,
    #[serde(default)]
    reference_count: u32,
    created_at: DateTime<Utc>,
}

impl VolumeRecord {
    /// Declare a new, idle volume. The mountpoint is derived here and never
    /// changes afterwards.
    pub fn new(name: impl Into<String>, params: ConnectionParams, volumes_dir: &Path) -> Self {
        let mountpoint = mountpoint_for(volumes_dir, &params.connection, params.port);
        Self {
            name: name.into(),
            params,
            mountpoint,
            reference_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    pub fn reference_count(&self) -> u32 {
        self.reference_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> MountState {
        if self.reference_count == 0 {
            MountState::Idle
        } else {
            MountState::Active
        }
    }

    /// Whether the stored mountpoint matches the one derived from the
    /// connection parameters under `volumes_dir`.
    pub fn mountpoint_is_consistent(&self, volumes_dir: &Path) -> bool {
        self.mountpoint == mountpoint_for(volumes_dir, &self.params.connection, self.params.port)
    }

    /// Record one more consumer; returns the new count
    pub(crate) fn acquire(&mut self) -> u32 {
        self.reference_count += 1;
        self.reference_count
    }

    /// Drop one consumer; `None` if nobody held the volume
    pub(crate) fn release(&mut self) -> Option<u32> {
        self.reference_count = self.reference_count.checked_sub(1)?;
        Some(self.reference_count)
    }

    /// Point-in-time view without credentials
    pub fn info(&self) -> VolumeInfo {
        VolumeInfo {
            name: self.name.clone(),
            mountpoint: self.mountpoint.clone(),
            created_at: self.created_at,
            reference_count: self.reference_count,
            state: self.state(),
        }
    }
}

/// Snapshot of a volume returned by Get and List
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeInfo {
    pub name: String,
    pub mountpoint: PathBuf,
    pub created_at: DateTime<Utc>,
    pub reference_count: u32,
    pub state: MountState,
}
