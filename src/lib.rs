//! sshfs-volume: reference-counted lifecycle manager for sshfs-backed volumes
//!
//! Named volumes are declared with connection parameters, mounted on demand
//! when their first consumer arrives, and unmounted when the last consumer
//! leaves. The volume table is written through to a JSON snapshot after every
//! change so a restarted process resumes with the same volumes and counters.
//!
//! # Architecture
//!
//! - **Volume table**: volume records keyed by name, each with a mountpoint
//!   derived from its remote endpoint and a consumer count.
//! - **State store**: atomic JSON snapshot of the table.
//! - **Mount invoker**: performs the physical mount; `sshfs` in production,
//!   a scripted double in tests.
//! - **Volume manager**: serializes lifecycle operations and decides when the
//!   invoker runs.
//! - **Protocol**: volume plugin API request/response shapes.
//!
//! # Example
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use sshfs_volume::config::Config;
//! use sshfs_volume::mount::VolumeManager;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_file("config.yaml".as_ref())?;
//! config.validate()?;
//! sshfs_volume::logging::init(&config.logging);
//!
//! let manager = VolumeManager::from_config(&config)?;
//! let mut opts = BTreeMap::new();
//! opts.insert("sshcmd".to_string(), "user@host:/srv/data".to_string());
//! manager.create("data", &opts)?;
//!
//! let path = manager.mount("data", "container-1").await?;
//! println!("mounted at {}", path.display());
//! manager.unmount("data", "container-1").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod env;
pub mod error;
pub mod invoker;
pub mod logging;
pub mod mount;
pub mod protocol;
pub mod store;
pub mod volume;

pub use error::{ErrorKind, Result, VolumeError};
pub use mount::VolumeManager;
pub use protocol::VolumePlugin;
