//! `MetricSource` for HotSpot JVMs: performance-data files for the JVM's own
//! counters, `sysinfo` for what the OS knows about the process.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sysinfo::{
    CpuRefreshKind, MINIMUM_CPU_UPDATE_INTERVAL, Pid, ProcessRefreshKind, ProcessesToUpdate,
    System, UpdateKind,
};

use super::perfdata::PerfData;
use super::source::{FetchError, MetricSource};
use crate::health::{MemoryUsage, Metrics, Snapshot, UNAVAILABLE, UNAVAILABLE_LOAD};

const PERFDATA_DIR_PREFIX: &str = "hsperfdata_";
const HEAP_GENERATIONS: usize = 2;
const NANOS_PER_MILLI: i64 = 1_000_000;
const UNKNOWN_NAME: &str = "unknown";

/// What the OS reports about a process, independent of the JVM.
#[derive(Clone, Debug, PartialEq)]
pub struct OsStats {
    pub cpu_time_nanos: i64,
    pub cpu_load_fraction: f64,
    pub open_files: i64,
    pub open_files_limit: i64,
    pub command: String,
    pub name: String,
}

impl OsStats {
    pub const UNKNOWN: OsStats = OsStats {
        cpu_time_nanos: UNAVAILABLE,
        cpu_load_fraction: UNAVAILABLE_LOAD,
        open_files: UNAVAILABLE,
        open_files_limit: UNAVAILABLE,
        command: String::new(),
        name: String::new(),
    };
}

pub struct HotspotSource {
    roots: Vec<PathBuf>,
    system: Mutex<System>,
    cpu_count: usize,
}

impl HotspotSource {
    /// Searches the system temp directory plus `extra_roots`.
    ///
    /// Blocks for [`MINIMUM_CPU_UPDATE_INTERVAL`] so the first listing can
    /// report a CPU load.
    pub fn new(extra_roots: &[PathBuf]) -> Self {
        let mut roots = vec![std::env::temp_dir()];
        if cfg!(unix) {
            roots.push(PathBuf::from("/tmp"));
        }
        roots.extend(extra_roots.iter().cloned());

        let source = Self::with_roots(roots);
        source.lock_system().refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cpu(),
        );
        std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL);
        source
    }

    /// Searches exactly `roots`, without priming CPU sampling.
    pub fn with_roots(mut roots: Vec<PathBuf>) -> Self {
        let mut seen = HashSet::new();
        roots.retain(|root| seen.insert(root.clone()));

        let mut system = System::new();
        system.refresh_cpu_list(CpuRefreshKind::nothing());
        let cpu_count = system.cpus().len();

        Self {
            roots,
            system: Mutex::new(system),
            cpu_count,
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn lock_system(&self) -> MutexGuard<'_, System> {
        self.system.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every `hsperfdata_*/<pid>` file under the roots, keyed by pid.
    fn perfdata_files(&self) -> HashMap<String, PathBuf> {
        let mut files = HashMap::new();
        for root in &self.roots {
            for dir in perfdata_dirs(root) {
                let Ok(entries) = fs::read_dir(&dir) else {
                    tracing::debug!(dir = %dir.display(), "cannot read perf-data directory");
                    continue;
                };
                for entry in entries.flatten() {
                    let file_name = entry.file_name();
                    let Some(name) = file_name.to_str() else {
                        continue;
                    };
                    if name.parse::<u32>().is_ok() && entry.path().is_file() {
                        files.entry(name.to_string()).or_insert_with(|| entry.path());
                    }
                }
            }
        }
        files
    }

    fn locate(&self, id: &str) -> Option<PathBuf> {
        self.roots
            .iter()
            .flat_map(|root| perfdata_dirs(root))
            .map(|dir| dir.join(id))
            .find(|path| path.is_file())
    }

    fn os_stats(&self, pid: u32) -> Option<OsStats> {
        let pid = Pid::from_u32(pid);
        let mut system = self.lock_system();
        if system.process(pid).is_none() {
            system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[pid]),
                true,
                refresh_kind(),
            );
        }
        let process = system.process(pid)?;

        let cpu_load_fraction = if self.cpu_count == 0 {
            UNAVAILABLE_LOAD
        } else {
            let per_core = f64::from(process.cpu_usage()) / 100.0;
            (per_core / self.cpu_count as f64).clamp(0.0, 1.0)
        };
        let cpu_millis = i64::try_from(process.accumulated_cpu_time()).unwrap_or(i64::MAX);
        let count = |n: Option<usize>| n.and_then(|n| i64::try_from(n).ok()).unwrap_or(UNAVAILABLE);

        Some(OsStats {
            cpu_time_nanos: cpu_millis.saturating_mul(NANOS_PER_MILLI),
            cpu_load_fraction,
            open_files: count(process.open_files()),
            open_files_limit: count(process.open_files_limit()),
            command: process
                .cmd()
                .iter()
                .map(|s| s.to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join(" "),
            name: process.name().to_string_lossy().to_string(),
        })
    }
}

fn refresh_kind() -> ProcessRefreshKind {
    ProcessRefreshKind::nothing()
        .with_cpu()
        .with_cmd(UpdateKind::OnlyIfNotSet)
}

fn perfdata_dirs(root: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::debug!(root = %root.display(), %err, "skipping perf-data root");
            return Vec::new();
        }
    };
    entries
        .flatten()
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(PERFDATA_DIR_PREFIX))
        })
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect()
}

impl MetricSource for HotspotSource {
    fn list_process_identifiers(&self) -> HashSet<String> {
        let files = self.perfdata_files();
        let pids: Vec<Pid> = files
            .keys()
            .filter_map(|id| id.parse::<u32>().ok())
            .map(Pid::from_u32)
            .collect();

        let mut system = self.lock_system();
        system.refresh_processes_specifics(ProcessesToUpdate::Some(&pids), true, refresh_kind());

        files
            .into_iter()
            .filter(|(id, path)| {
                let alive = id
                    .parse::<u32>()
                    .is_ok_and(|pid| system.process(Pid::from_u32(pid)).is_some());
                if !alive {
                    tracing::debug!(%id, path = %path.display(), "stale perf-data file");
                }
                alive
            })
            .map(|(id, _)| id)
            .collect()
    }

    fn current_process_identifier(&self) -> Option<String> {
        sysinfo::get_current_pid()
            .ok()
            .map(|pid| pid.as_u32().to_string())
    }

    fn fetch_snapshot(&self, id: &str) -> Result<Snapshot, FetchError> {
        let pid: u32 = id
            .parse()
            .map_err(|_| FetchError::InvalidId(id.to_string()))?;
        let path = self
            .locate(id)
            .ok_or_else(|| FetchError::NotFound(id.to_string()))?;
        let bytes = fs::read(&path).map_err(|source| FetchError::Io {
            id: id.to_string(),
            source,
        })?;
        let perf = PerfData::parse(&bytes).map_err(|source| FetchError::PerfData {
            id: id.to_string(),
            source,
        })?;
        if !perf.is_accessible() {
            return Err(FetchError::NotAccessible(id.to_string()));
        }
        let os = self
            .os_stats(pid)
            .ok_or_else(|| FetchError::Exited(id.to_string()))?;

        let snapshot = Snapshot::try_new(id, display_name(&perf, &os), metrics_from(&perf, &os))?;
        tracing::debug!(%id, counters = perf.len(), "read snapshot");
        Ok(snapshot)
    }
}

/// The JVM's main class and arguments, else the OS command line.
pub fn display_name(perf: &PerfData, os: &OsStats) -> String {
    [
        perf.text("sun.rt.javaCommand").unwrap_or_default(),
        os.command.as_str(),
        os.name.as_str(),
    ]
    .into_iter()
    .map(str::trim)
    .find(|s| !s.is_empty())
    .unwrap_or(UNKNOWN_NAME)
    .to_string()
}

/// Maps performance counters and OS statistics onto snapshot metrics.
/// Missing counters become sentinels.
pub fn metrics_from(perf: &PerfData, os: &OsStats) -> Metrics {
    Metrics {
        cpu_time_nanos: measured(os.cpu_time_nanos),
        gc_time_millis: gc_time_millis(perf),
        heap_usage: heap_usage(perf),
        non_heap_usage: metaspace_usage(perf),
        open_file_descriptors: measured(os.open_files),
        max_file_descriptors: measured(os.open_files_limit),
        thread_count: perf.long("java.threads.live").map_or(UNAVAILABLE, measured),
        // not exported through performance data
        direct_buffer_bytes: UNAVAILABLE,
        mapped_buffer_bytes: UNAVAILABLE,
        loaded_class_count: loaded_classes(perf),
        cpu_load_fraction: if (0.0..=1.0).contains(&os.cpu_load_fraction) {
            os.cpu_load_fraction
        } else {
            UNAVAILABLE_LOAD
        },
    }
}

fn measured(value: i64) -> i64 {
    if value < 0 { UNAVAILABLE } else { value }
}

fn gc_time_millis(perf: &PerfData) -> i64 {
    let Some(frequency) = perf.long("sun.os.hrt.frequency").filter(|f| *f > 0) else {
        return UNAVAILABLE;
    };
    let ticks: Vec<i64> = (0..)
        .map_while(|n| perf.long(&format!("sun.gc.collector.{n}.time")))
        .collect();
    if ticks.is_empty() {
        return UNAVAILABLE;
    }
    let total: i128 = ticks.iter().map(|&t| i128::from(t.max(0))).sum();
    i64::try_from(total * 1_000 / i128::from(frequency)).unwrap_or(i64::MAX)
}

fn heap_usage(perf: &PerfData) -> MemoryUsage {
    let mut usage = MemoryUsage::NONE;
    let mut max_known = false;
    for generation in 0..HEAP_GENERATIONS {
        let prefix = format!("sun.gc.generation.{generation}");
        let Some(capacity) = perf.long(&format!("{prefix}.capacity")) else {
            continue;
        };
        usage.committed = usage.committed.saturating_add(capacity.max(0));
        usage.init = usage
            .init
            .saturating_add(perf.long(&format!("{prefix}.minCapacity")).unwrap_or(0).max(0));
        if let Some(max) = perf.long(&format!("{prefix}.maxCapacity")) {
            usage.max = usage.max.saturating_add(max.max(0));
            max_known = true;
        }
        // the declared count is untrusted, stop at the first missing space
        let spaces = perf.long(&format!("{prefix}.spaces")).unwrap_or(0);
        let used_by_space =
            (0..spaces).map_while(|space| perf.long(&format!("{prefix}.space.{space}.used")));
        for used in used_by_space {
            usage.used = usage.used.saturating_add(used.max(0));
        }
    }
    if usage != MemoryUsage::NONE && !max_known {
        usage.max = UNAVAILABLE;
    }
    usage
}

fn metaspace_usage(perf: &PerfData) -> MemoryUsage {
    let Some(committed) = perf.long("sun.gc.metaspace.capacity") else {
        return MemoryUsage::NONE;
    };
    let read = |name: &str| perf.long(&format!("sun.gc.metaspace.{name}"));
    MemoryUsage {
        init: read("minCapacity").unwrap_or(0).max(0),
        used: read("used").unwrap_or(0).max(0),
        committed: committed.max(0),
        max: read("maxCapacity").map_or(UNAVAILABLE, measured),
    }
}

fn loaded_classes(perf: &PerfData) -> i64 {
    let Some(loaded) = perf.long("java.cls.loadedClasses") else {
        return UNAVAILABLE;
    };
    let other = |name: &str| i128::from(perf.long(name).unwrap_or(0));
    let live = i128::from(loaded) + other("java.cls.sharedLoadedClasses")
        - other("java.cls.unloadedClasses")
        - other("java.cls.sharedUnloadedClasses");
    i64::try_from(live.max(0)).unwrap_or(i64::MAX)
}
