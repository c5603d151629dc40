//! Filesystem backends for the lock, the source and the destination.
//!
//! These let a single host (or several sharing a filesystem) run the daemon
//! without any cloud service. [`build`] turns [`Settings`] into the trait
//! objects the syncer consumes.

mod file_destination;
mod file_source;
mod locker;

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use targetsync_core::{Error, Locker, Result, Target, TargetDestination, TargetSource};

use crate::settings::{DestinationSettings, LockerSettings, Settings, SourceSettings};

pub use file_destination::FileDestination;
pub use file_source::FileSource;
pub use locker::{FileLocker, LocalLocker};

/// The backends a [`LeaderRunner`](targetsync_reconciler::LeaderRunner) runs against.
pub struct Backends {
    pub locker: Arc<dyn Locker>,
    pub source: Arc<dyn TargetSource>,
    pub destination: Arc<dyn TargetDestination>,
}

/// Construct the backends named in `settings`.
#[must_use]
pub fn build(settings: &Settings) -> Backends {
    let locker: Arc<dyn Locker> = match &settings.locker {
        LockerSettings::Local => Arc::new(LocalLocker),
        LockerSettings::File {
            path,
            poll_interval,
        } => Arc::new(FileLocker::new(path.clone(), *poll_interval)),
    };

    let source: Arc<dyn TargetSource> = match &settings.source {
        SourceSettings::File {
            path,
            poll_interval,
        } => Arc::new(FileSource::new(path.clone(), *poll_interval)),
    };

    let destination: Arc<dyn TargetDestination> = match &settings.destination {
        DestinationSettings::File { path } => Arc::new(FileDestination::new(path.clone())),
    };

    Backends {
        locker,
        source,
        destination,
    }
}

/// Read a JSON targets file, or `None` if it does not exist.
async fn read_targets(path: &Path) -> Result<Option<Vec<Target>>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::file_read_failed(path, e)),
    };
    parse_targets(path, &content).map(Some)
}

fn parse_targets(path: &Path, content: &str) -> Result<Vec<Target>> {
    serde_json::from_str(content).map_err(|e| Error::config_parse_failed(path, e))
}
