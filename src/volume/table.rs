//! Name → record mapping

use std::collections::btree_map::{self, BTreeMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::record::VolumeRecord;
use crate::error::{Result, VolumeError};

/// The resource table. Serializes as a JSON object keyed by volume name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeTable {
    volumes: BTreeMap<String, VolumeRecord>,
}

impl VolumeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.volumes.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&VolumeRecord> {
        self.volumes.get(name)
    }

    /// Like `get`, but an unknown name is an error
    pub fn lookup(&self, name: &str) -> Result<&VolumeRecord> {
        self.volumes
            .get(name)
            .ok_or_else(|| VolumeError::UnknownVolume(name.to_string()))
    }

    pub(crate) fn lookup_mut(&mut self, name: &str) -> Result<&mut VolumeRecord> {
        self.volumes
            .get_mut(name)
            .ok_or_else(|| VolumeError::UnknownVolume(name.to_string()))
    }

    /// Insert a new record; an existing name is rejected, never replaced
    pub fn insert(&mut self, record: VolumeRecord) -> Result<()> {
        match self.volumes.entry(record.name().to_string()) {
            btree_map::Entry::Occupied(entry) => Err(VolumeError::AlreadyExists(entry.key().clone())),
            btree_map::Entry::Vacant(entry) => {
                entry.insert(record);
                Ok(())
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Result<VolumeRecord> {
        self.volumes
            .remove(name)
            .ok_or_else(|| VolumeError::UnknownVolume(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &VolumeRecord> {
        self.volumes.values()
    }

    /// Other volumes resolving to the same mountpoint as `name`
    pub fn sharing_mountpoint<'a>(
        &'a self,
        name: &'a str,
        mountpoint: &'a Path,
    ) -> impl Iterator<Item = &'a VolumeRecord> + 'a {
        self.volumes
            .values()
            .filter(move |r| r.name() != name && r.mountpoint() == mountpoint)
    }

    /// Whether another volume currently holds `mountpoint` mounted
    pub fn mountpoint_held_by_other(&self, name: &str, mountpoint: &Path) -> bool {
        self.sharing_mountpoint(name, mountpoint)
            .any(|r| r.reference_count() > 0)
    }

    /// Check a freshly loaded table: keys must match record names and every
    /// mountpoint must be reproducible from its connection parameters.
    pub fn validate(&self, volumes_dir: &Path) -> Result<()> {
        for (key, record) in &self.volumes {
            if key != record.name() {
                return Err(VolumeError::CorruptState(format!(
                    "entry {:?} holds a record named {:?}",
                    key,
                    record.name()
                )));
            }
            if !record.mountpoint_is_consistent(volumes_dir) {
                return Err(VolumeError::CorruptState(format!(
                    "volume {:?} has mountpoint {:?} which does not derive from its connection under {:?}",
                    key,
                    record.mountpoint(),
                    volumes_dir
                )));
            }
        }
        Ok(())
    }
}
