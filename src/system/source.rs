use std::collections::HashSet;
use std::io;

use thiserror::Error;

use super::perfdata::PerfDataError;
use crate::health::{Snapshot, SnapshotError};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("`{0}` is not a process id")]
    InvalidId(String),
    #[error("no performance data found for process {0}")]
    NotFound(String),
    #[error("process {0} is no longer running")]
    Exited(String),
    #[error("performance data for process {0} is not accessible yet")]
    NotAccessible(String),
    #[error("reading performance data for process {id}: {source}")]
    Io {
        id: String,
        #[source]
        source: io::Error,
    },
    #[error("malformed performance data for process {id}: {source}")]
    PerfData {
        id: String,
        #[source]
        source: PerfDataError,
    },
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Discovers local JVMs and reads one snapshot from each.
///
/// Fetches run on blocking worker threads, one per process, so
/// implementations must be shareable across threads.
pub trait MetricSource: Send + Sync {
    fn list_process_identifiers(&self) -> HashSet<String>;

    /// Identifier of the inspecting process, excluded from every listing.
    fn current_process_identifier(&self) -> Option<String>;

    fn fetch_snapshot(&self, id: &str) -> Result<Snapshot, FetchError>;
}
