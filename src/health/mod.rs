//! Snapshot model plus the delta and classification rules applied to it.
//!
//! Nothing in here knows where snapshots come from.

pub mod classify;
pub mod delta;
pub mod snapshot;

pub use classify::{Classifier, Health, Thresholds};
pub use delta::{Delta, gc_fraction};
pub use snapshot::{
    MemoryUsage, Metrics, Snapshot, SnapshotError, UNAVAILABLE, UNAVAILABLE_LOAD, ZERO,
};
