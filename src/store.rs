//! Durable snapshot of the volume table
//!
//! The whole table is written as one JSON document. Writes go to a temporary
//! sibling first and are renamed into place, so a crash leaves either the old
//! snapshot or the new one on disk, never a torn file.

use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::error::{Result, VolumeError};
use crate::volume::VolumeTable;

/// The state file may hold passwords
const STATE_FILE_MODE: u32 = 0o600;

/// File-backed persistent store
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the last saved table. A missing file is an empty table.
    pub fn load(&self) -> Result<VolumeTable> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No state file at {:?}, starting empty", self.path);
                return Ok(VolumeTable::new());
            }
            Err(e) => {
                return Err(VolumeError::CorruptState(format!(
                    "failed to read {:?}: {}",
                    self.path, e
                )))
            }
        };

        let table: VolumeTable = serde_json::from_slice(&data).map_err(|e| {
            VolumeError::CorruptState(format!("failed to parse {:?}: {}", self.path, e))
        })?;

        debug!("Loaded {} volume(s) from {:?}", table.len(), self.path);
        Ok(table)
    }

    /// Replace the stored snapshot with `table`
    pub fn save(&self, table: &VolumeTable) -> Result<()> {
        let data = serde_json::to_vec_pretty(table)
            .map_err(|e| VolumeError::Persist(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        atomic_write(&self.path, &data).map_err(VolumeError::Persist)?;
        trace!("Saved {} volume(s) to {:?}", table.len(), self.path);
        Ok(())
    }
}

/// Write to a temp file, fsync it, rename over `target`, then fsync the
/// parent so the rename itself survives a crash.
fn atomic_write(target: &Path, content: &[u8]) -> io::Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "state path has no parent"))?;
    fs::create_dir_all(parent)?;

    let temp_path = parent.join(format!(
        ".{}.tmp.{}",
        target.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id()
    ));

    let written = (|| {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(STATE_FILE_MODE)
            .open(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
        fs::rename(&temp_path, target)
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    if let Ok(dir) = fs::File::open(parent) {
        let _ = dir.sync_all();
    }

    Ok(())
}
