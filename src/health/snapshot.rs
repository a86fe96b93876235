use thiserror::Error;

/// Sentinel for an integer metric that could not be read.
pub const UNAVAILABLE: i64 = -1;
/// Sentinel for the CPU load fraction when it could not be read.
pub const UNAVAILABLE_LOAD: f64 = -1.0;

const NANOS_PER_MILLI: i64 = 1_000_000;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SnapshotError {
    #[error("snapshot is missing a process identifier")]
    MissingId,
    #[error("snapshot for {id} is missing a display name")]
    MissingDisplayName { id: String },
    #[error("snapshot for {id} has invalid {field}: {value}")]
    InvalidMetric {
        id: String,
        field: &'static str,
        value: f64,
    },
}

/// Byte counts of one memory area. `max == -1` means unbounded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    pub init: i64,
    pub used: i64,
    pub committed: i64,
    pub max: i64,
}

impl MemoryUsage {
    pub const NONE: MemoryUsage = MemoryUsage {
        init: 0,
        used: 0,
        committed: 0,
        max: 0,
    };
}

/// Every measured value of a snapshot. Integer fields use [`UNAVAILABLE`],
/// the load uses [`UNAVAILABLE_LOAD`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Metrics {
    pub cpu_time_nanos: i64,
    pub gc_time_millis: i64,
    pub heap_usage: MemoryUsage,
    pub non_heap_usage: MemoryUsage,
    pub open_file_descriptors: i64,
    pub max_file_descriptors: i64,
    pub thread_count: i64,
    pub direct_buffer_bytes: i64,
    pub mapped_buffer_bytes: i64,
    pub loaded_class_count: i64,
    pub cpu_load_fraction: f64,
}

impl Metrics {
    pub const ZERO: Metrics = Metrics {
        cpu_time_nanos: 0,
        gc_time_millis: 0,
        heap_usage: MemoryUsage::NONE,
        non_heap_usage: MemoryUsage::NONE,
        open_file_descriptors: 0,
        max_file_descriptors: 0,
        thread_count: 0,
        direct_buffer_bytes: 0,
        mapped_buffer_bytes: 0,
        loaded_class_count: 0,
        cpu_load_fraction: 0.0,
    };

    fn invalid_field(&self) -> Option<(&'static str, f64)> {
        let counters = [
            ("cpu_time_nanos", self.cpu_time_nanos),
            ("gc_time_millis", self.gc_time_millis),
            ("open_file_descriptors", self.open_file_descriptors),
            ("max_file_descriptors", self.max_file_descriptors),
            ("thread_count", self.thread_count),
            ("direct_buffer_bytes", self.direct_buffer_bytes),
            ("mapped_buffer_bytes", self.mapped_buffer_bytes),
            ("loaded_class_count", self.loaded_class_count),
        ];
        if let Some((field, value)) = counters.into_iter().find(|(_, v)| *v < UNAVAILABLE) {
            return Some((field, value as f64));
        }

        let areas = [
            ("heap_usage", self.heap_usage),
            ("non_heap_usage", self.non_heap_usage),
        ];
        for (field, usage) in areas {
            let sizes = [usage.init, usage.used, usage.committed];
            if let Some(value) = sizes.into_iter().find(|v| *v < 0) {
                return Some((field, value as f64));
            }
            if usage.max < UNAVAILABLE {
                return Some((field, usage.max as f64));
            }
        }

        let load = self.cpu_load_fraction;
        let load_ok = load == UNAVAILABLE_LOAD || (0.0..=1.0).contains(&load);
        if !load_ok {
            return Some(("cpu_load_fraction", load));
        }
        None
    }
}

/// Metrics of one process at one instant.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    id: String,
    display_name: String,
    metrics: Metrics,
}

/// Baseline used when a process has no earlier snapshot, so that a delta
/// against it yields lifetime totals. Compared by value only.
pub static ZERO: Snapshot = Snapshot {
    id: String::new(),
    display_name: String::new(),
    metrics: Metrics::ZERO,
};

impl Snapshot {
    pub fn try_new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        metrics: Metrics,
    ) -> Result<Self, SnapshotError> {
        let id = id.into();
        let display_name = display_name.into();
        if id.is_empty() {
            return Err(SnapshotError::MissingId);
        }
        if display_name.is_empty() {
            return Err(SnapshotError::MissingDisplayName { id });
        }
        if let Some((field, value)) = metrics.invalid_field() {
            return Err(SnapshotError::InvalidMetric { id, field, value });
        }
        Ok(Self {
            id,
            display_name,
            metrics,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn is_zero(&self) -> bool {
        *self == ZERO
    }

    pub fn cpu_time_nanos(&self) -> i64 {
        self.metrics.cpu_time_nanos
    }

    /// CPU time truncated to whole milliseconds.
    pub fn cpu_time_millis(&self) -> i64 {
        self.metrics.cpu_time_nanos / NANOS_PER_MILLI
    }

    pub fn gc_time_millis(&self) -> i64 {
        self.metrics.gc_time_millis
    }

    pub fn heap_usage(&self) -> MemoryUsage {
        self.metrics.heap_usage
    }

    pub fn non_heap_usage(&self) -> MemoryUsage {
        self.metrics.non_heap_usage
    }

    pub fn open_file_descriptors(&self) -> i64 {
        self.metrics.open_file_descriptors
    }

    pub fn max_file_descriptors(&self) -> i64 {
        self.metrics.max_file_descriptors
    }

    pub fn thread_count(&self) -> i64 {
        self.metrics.thread_count
    }

    pub fn direct_buffer_bytes(&self) -> i64 {
        self.metrics.direct_buffer_bytes
    }

    pub fn mapped_buffer_bytes(&self) -> i64 {
        self.metrics.mapped_buffer_bytes
    }

    pub fn loaded_class_count(&self) -> i64 {
        self.metrics.loaded_class_count
    }

    pub fn cpu_load_fraction(&self) -> f64 {
        self.metrics.cpu_load_fraction
    }

    /// Heap plus non-heap bytes in use, saturating at `i64::MAX`.
    pub fn used_memory(&self) -> i64 {
        self.metrics
            .heap_usage
            .used
            .saturating_add(self.metrics.non_heap_usage.used)
    }

    /// Heap plus non-heap bytes committed by the OS, saturating at `i64::MAX`.
    pub fn committed_memory(&self) -> i64 {
        self.metrics
            .heap_usage
            .committed
            .saturating_add(self.metrics.non_heap_usage.committed)
    }

    /// Buffer-pool bytes over the pools that could be read, or the sentinel
    /// when neither could.
    pub fn buffer_pool_bytes(&self) -> i64 {
        let pools = [
            self.metrics.direct_buffer_bytes,
            self.metrics.mapped_buffer_bytes,
        ];
        if pools.iter().all(|&b| b == UNAVAILABLE) {
            return UNAVAILABLE;
        }
        pools
            .iter()
            .filter(|&&b| b != UNAVAILABLE)
            .fold(0i64, |total, &b| total.saturating_add(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> Metrics {
        Metrics {
            cpu_time_nanos: 2_500_000_000,
            gc_time_millis: 40,
            heap_usage: MemoryUsage {
                init: 64,
                used: 100,
                committed: 128,
                max: -1,
            },
            open_file_descriptors: UNAVAILABLE,
            direct_buffer_bytes: UNAVAILABLE,
            mapped_buffer_bytes: UNAVAILABLE,
            cpu_load_fraction: UNAVAILABLE_LOAD,
            ..Metrics::ZERO
        }
    }

    #[test]
    fn zero_has_empty_identity_and_zero_counters() {
        assert_eq!(ZERO.id(), "");
        assert_eq!(ZERO.display_name(), "");
        assert_eq!(ZERO.cpu_time_nanos(), 0);
        assert_eq!(ZERO.heap_usage(), MemoryUsage::NONE);
        assert_eq!(ZERO.cpu_load_fraction(), 0.0);
        assert!(ZERO.is_zero());
    }

    #[test]
    fn constructs_with_sentinels_and_unbounded_max() {
        let snap = Snapshot::try_new("17", "app.Main", metrics()).unwrap();
        assert_eq!(snap.id(), "17");
        assert_eq!(snap.heap_usage().max, -1);
        assert_eq!(snap.open_file_descriptors(), UNAVAILABLE);
        assert!(!snap.is_zero());
    }

    #[test]
    fn rejects_missing_identity() {
        assert_eq!(
            Snapshot::try_new("", "app.Main", metrics()),
            Err(SnapshotError::MissingId)
        );
        assert_eq!(
            Snapshot::try_new("17", "", metrics()),
            Err(SnapshotError::MissingDisplayName { id: "17".into() })
        );
    }

    #[test]
    fn rejects_negative_values_other_than_sentinel() {
        let bad = Metrics {
            thread_count: -2,
            ..metrics()
        };
        let err = Snapshot::try_new("17", "app.Main", bad).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::InvalidMetric {
                field: "thread_count",
                ..
            }
        ));

        let bad_used = Metrics {
            non_heap_usage: MemoryUsage {
                used: -1,
                ..MemoryUsage::NONE
            },
            ..metrics()
        };
        let err = Snapshot::try_new("17", "app.Main", bad_used).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::InvalidMetric {
                field: "non_heap_usage",
                ..
            }
        ));
    }

    #[test]
    fn rejects_load_outside_unit_interval() {
        let bad = Metrics {
            cpu_load_fraction: 1.5,
            ..metrics()
        };
        assert!(Snapshot::try_new("17", "app.Main", bad).is_err());
    }

    #[test]
    fn cpu_millis_truncates() {
        let snap = Snapshot::try_new(
            "1",
            "x",
            Metrics {
                cpu_time_nanos: 1_999_999,
                ..Metrics::ZERO
            },
        )
        .unwrap();
        assert_eq!(snap.cpu_time_millis(), 1);
    }

    #[test]
    fn buffer_pool_bytes_ignores_unreadable_pool() {
        let both_missing = Snapshot::try_new("1", "x", metrics()).unwrap();
        assert_eq!(both_missing.buffer_pool_bytes(), UNAVAILABLE);

        let one_missing = Snapshot::try_new(
            "1",
            "x",
            Metrics {
                direct_buffer_bytes: 4096,
                ..metrics()
            },
        )
        .unwrap();
        assert_eq!(one_missing.buffer_pool_bytes(), 4096);
    }

    #[test]
    fn aggregates_saturate_instead_of_overflowing() {
        let huge = Snapshot::try_new(
            "1",
            "x",
            Metrics {
                heap_usage: MemoryUsage {
                    used: i64::MAX,
                    committed: i64::MAX / 2 + 1,
                    ..MemoryUsage::NONE
                },
                non_heap_usage: MemoryUsage {
                    used: 1,
                    committed: i64::MAX / 2 + 1,
                    ..MemoryUsage::NONE
                },
                direct_buffer_bytes: i64::MAX,
                mapped_buffer_bytes: 1,
                ..Metrics::ZERO
            },
        )
        .unwrap();
        assert_eq!(huge.used_memory(), i64::MAX);
        assert_eq!(huge.committed_memory(), i64::MAX);
        assert_eq!(huge.buffer_pool_bytes(), i64::MAX);
    }
}
