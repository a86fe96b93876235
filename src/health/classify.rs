use std::fmt;

use super::delta::gc_fraction;
use super::snapshot::Snapshot;

/// Limits above which a snapshot is flagged. Every comparison is strict.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    pub gc_fraction: f64,
    pub memory_ratio: f64,
    pub open_file_descriptors: i64,
    pub threads: i64,
    pub buffer_bytes: i64,
    pub loaded_classes: i64,
}

impl Thresholds {
    pub const DEFAULT: Thresholds = Thresholds {
        gc_fraction: 0.20,
        memory_ratio: 1.10,
        open_file_descriptors: 500,
        threads: 500,
        buffer_bytes: 1_000_000_000,
        loaded_classes: 1_000_000,
    };
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Outcome of classifying one snapshot, in rule priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Health {
    GcPressure,
    MemoryOvercommit,
    FileDescriptors,
    Threads,
    BufferPools,
    LoadedClasses,
    /// CPU load in tenths, `0..=9`.
    Load(u8),
}

impl Health {
    pub fn as_char(self) -> char {
        match self {
            Health::GcPressure => 'G',
            Health::MemoryOvercommit => 'M',
            Health::FileDescriptors => 'F',
            Health::Threads => 'T',
            Health::BufferPools => 'B',
            Health::LoadedClasses => 'C',
            Health::Load(tenths) => char::from(b'0' + tenths.min(9)),
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Classifier {
    thresholds: Thresholds,
}

impl Classifier {
    pub const fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Reduces a snapshot to one health code. The first matching rule wins.
    pub fn classify(&self, current: &Snapshot, prior: Option<&Snapshot>) -> Health {
        let t = &self.thresholds;

        if let Some(prior) = prior
            && gc_fraction(current, prior) > t.gc_fraction
        {
            return Health::GcPressure;
        }
        if memory_ratio(current).is_some_and(|ratio| ratio > t.memory_ratio) {
            return Health::MemoryOvercommit;
        }
        if current.open_file_descriptors() > t.open_file_descriptors {
            return Health::FileDescriptors;
        }
        if current.thread_count() > t.threads {
            return Health::Threads;
        }
        let buffers = i128::from(current.direct_buffer_bytes())
            + i128::from(current.mapped_buffer_bytes());
        if buffers > i128::from(t.buffer_bytes) {
            return Health::BufferPools;
        }
        if current.loaded_class_count() > t.loaded_classes {
            return Health::LoadedClasses;
        }

        let mut load = current.cpu_load_fraction();
        if let Some(prior) = prior {
            load = load.max(prior.cpu_load_fraction());
        }
        Health::Load(load_tenths(load))
    }

    pub fn classify_char(&self, current: &Snapshot, prior: Option<&Snapshot>) -> char {
        self.classify(current, prior).as_char()
    }
}

/// Used memory over heap max; `None` when the max is unbounded or zero.
fn memory_ratio(snapshot: &Snapshot) -> Option<f64> {
    let max = snapshot.heap_usage().max;
    if max <= 0 {
        return None;
    }
    let used =
        i128::from(snapshot.heap_usage().used) + i128::from(snapshot.non_heap_usage().used);
    Some(used as f64 / max as f64)
}

/// Rounds half away from zero; the `-1.0` sentinel lands on 0.
fn load_tenths(load: f64) -> u8 {
    (load * 10.0).round().clamp(0.0, 9.0) as u8
}
