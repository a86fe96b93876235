use super::snapshot::Snapshot;

const NANOS_PER_MILLI: i128 = 1_000_000;

/// Fraction of CPU time spent in GC between `prior` and `current`.
///
/// Returns exactly `0.0` when no CPU time elapsed. A counter reset between
/// the two snapshots yields a negative fraction, which is returned as is.
pub fn gc_fraction(current: &Snapshot, prior: &Snapshot) -> f64 {
    let cpu_diff = i128::from(current.cpu_time_nanos()) - i128::from(prior.cpu_time_nanos());
    let gc_diff_nanos = (i128::from(current.gc_time_millis()) - i128::from(prior.gc_time_millis()))
        * NANOS_PER_MILLI;
    if cpu_diff == 0 {
        0.0
    } else {
        gc_diff_nanos as f64 / cpu_diff as f64
    }
}

/// Derived rates between two snapshots of one process.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Delta {
    pub gc_fraction: f64,
    pub gc_time_millis: i64,
    pub cpu_time_millis: i64,
}

impl Delta {
    /// Pass [`super::ZERO`] as `prior` for lifetime totals.
    pub fn between(current: &Snapshot, prior: &Snapshot) -> Self {
        Self {
            gc_fraction: gc_fraction(current, prior),
            gc_time_millis: current
                .gc_time_millis()
                .saturating_sub(prior.gc_time_millis()),
            cpu_time_millis: current
                .cpu_time_millis()
                .saturating_sub(prior.cpu_time_millis()),
        }
    }
}
