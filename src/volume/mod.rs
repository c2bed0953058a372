//! Volume records and the in-memory resource table
//!
//! A volume is a named declaration of a remote sshfs endpoint. Its local
//! mountpoint is derived from the connection identity, so volumes that reach
//! the same endpoint resolve to the same directory. Each record counts the
//! consumers currently holding it mounted; the 0 → 1 and 1 → 0 edges of that
//! counter are where the mount helper gets involved.

pub mod mountpoint;
pub mod params;
pub mod record;
pub mod table;

pub use mountpoint::mountpoint_for;
pub use params::{ConnectionParams, Credential};
pub use record::{MountState, VolumeInfo, VolumeRecord};
pub use table::VolumeTable;
