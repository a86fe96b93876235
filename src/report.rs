use crate::format::{human_bytes, sanitize_name, truncate_unicode};
use crate::health::{Classifier, Delta, Health};
use crate::system::Observation;

pub const COLUMN_LEGEND: &str = "\
Columns:
  H        Health: G gc > 20% of cpu, M memory over heap max, F > 500 open files,
           T > 500 threads, B > 1G buffer pools, C > 1M classes, else load 0-9
  GC/CPU   Fraction of cpu time spent garbage collecting
  GC       Time spent garbage collecting in ms
  CPU      Cpu time used in ms
  LOAD     Recent cpu load across all cores (0-1)
  MEM      Heap and non-heap memory used
  MEM+     Memory allocated to the jvm by the os
  MAX      Max allowed heap
  FD       Open file descriptors
  THR      Live threads
  BUF      Direct and mapped buffer pools. An unreadable pool is left out
           here but counts as -1 bytes towards the B health code
  CLS      Loaded classes
  NAME     The arguments used to start the jvm
A value of -1 means the metric could not be read.";

/// One table row, fully derived from an observation.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub health: Health,
    pub id: String,
    pub delta: Delta,
    pub cpu_load: f64,
    pub used_memory: i64,
    pub committed_memory: i64,
    pub max_memory: i64,
    pub open_file_descriptors: i64,
    pub threads: i64,
    pub buffer_bytes: i64,
    pub loaded_classes: i64,
    pub name: String,
}

impl Row {
    pub fn new(observation: &Observation, classifier: &Classifier) -> Self {
        let current = &observation.current;
        Row {
            health: classifier.classify(current, observation.prior.as_ref()),
            id: observation.id.clone(),
            delta: Delta::between(current, observation.baseline()),
            cpu_load: current.cpu_load_fraction(),
            used_memory: current.used_memory(),
            committed_memory: current.committed_memory(),
            max_memory: current.heap_usage().max,
            open_file_descriptors: current.open_file_descriptors(),
            threads: current.thread_count(),
            buffer_bytes: current.buffer_pool_bytes(),
            loaded_classes: current.loaded_class_count(),
            name: sanitize_name(current.display_name()),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Reporter {
    classifier: Classifier,
    /// Display columns for NAME; 0 leaves it whole.
    name_width: usize,
}

impl Reporter {
    pub fn new(classifier: Classifier, name_width: usize) -> Self {
        Self {
            classifier,
            name_width,
        }
    }

    pub fn rows(&self, observations: &[Observation]) -> Vec<Row> {
        observations
            .iter()
            .map(|o| Row::new(o, &self.classifier))
            .collect()
    }

    /// Header plus one line per observation, each ending in a newline.
    pub fn render_table(&self, observations: &[Observation]) -> String {
        let mut out = format_line(
            [
                "H", "PID", "GC/CPU", "GC", "CPU", "LOAD", "MEM", "MEM+", "MAX", "FD", "THR",
                "BUF", "CLS",
            ],
            "NAME",
        );
        for row in self.rows(observations) {
            let name = if self.name_width == 0 {
                row.name.clone()
            } else {
                truncate_unicode(&row.name, self.name_width)
            };
            let cells = [
                row.health.to_string(),
                row.id.clone(),
                format!("{:.2}", row.delta.gc_fraction),
                row.delta.gc_time_millis.to_string(),
                row.delta.cpu_time_millis.to_string(),
                format!("{:.2}", row.cpu_load),
                human_bytes(row.used_memory),
                human_bytes(row.committed_memory),
                human_bytes(row.max_memory),
                row.open_file_descriptors.to_string(),
                row.threads.to_string(),
                human_bytes(row.buffer_bytes),
                row.loaded_classes.to_string(),
            ];
            out.push_str(&format_line(cells.each_ref().map(String::as_str), &name));
        }
        out
    }

    /// One health character per observation, in order.
    pub fn render_compact(&self, observations: &[Observation]) -> String {
        observations
            .iter()
            .map(|o| self.classifier.classify_char(&o.current, o.prior.as_ref()))
            .collect()
    }
}

fn format_line(cells: [&str; 13], name: &str) -> String {
    let [h, id, frac, gc, cpu, load, mem, committed, max, fd, thr, buf, cls] = cells;
    format!(
        "{h:1}  {id:>8}  {frac:>6}  {gc:>7}  {cpu:>7}  {load:>5}  {mem:>5}  {committed:>5}  \
         {max:>5}  {fd:>5}  {thr:>5}  {buf:>5}  {cls:>7}  {name}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{MemoryUsage, Metrics, Snapshot, UNAVAILABLE, ZERO};

    fn observation(id: &str, metrics: Metrics, prior: Option<Metrics>) -> Observation {
        let snap = |m| Snapshot::try_new(id, "org.example.Server --port 8080", m).unwrap();
        Observation {
            id: id.to_string(),
            current: snap(metrics),
            prior: prior.map(snap),
        }
    }

    fn busy() -> Metrics {
        Metrics {
            cpu_time_nanos: 12_345_678_901,
            gc_time_millis: 617,
            heap_usage: MemoryUsage {
                init: 0,
                used: 256 * 1024 * 1024,
                committed: 512 * 1024 * 1024,
                max: 4 * 1024 * 1024 * 1024,
            },
            non_heap_usage: MemoryUsage {
                init: 0,
                used: 64 * 1024 * 1024,
                committed: 64 * 1024 * 1024,
                max: UNAVAILABLE,
            },
            open_file_descriptors: 120,
            max_file_descriptors: 4096,
            thread_count: 48,
            direct_buffer_bytes: UNAVAILABLE,
            mapped_buffer_bytes: UNAVAILABLE,
            loaded_class_count: 15_000,
            cpu_load_fraction: 0.31,
        }
    }

    fn tokens(line: &str) -> Vec<&str> {
        line.split_whitespace().collect()
    }

    #[test]
    fn table_has_header_and_one_row_per_process() {
        let observations = vec![
            observation("2", busy(), None),
            Observation {
                id: "42".into(),
                current: ZERO.clone(),
                prior: None,
            },
        ];
        let table = Reporter::default().render_table(&observations);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            tokens(lines[0]),
            vec![
                "H", "PID", "GC/CPU", "GC", "CPU", "LOAD", "MEM", "MEM+", "MAX", "FD", "THR",
                "BUF", "CLS", "NAME"
            ]
        );
        assert_eq!(
            tokens(lines[1]),
            vec![
                "3",
                "2",
                "0.05",
                "617",
                "12345",
                "0.31",
                "320M",
                "576M",
                "4G",
                "120",
                "48",
                "-1",
                "15000",
                "org.example.Server",
                "--port",
                "8080"
            ]
        );
        assert_eq!(
            tokens(lines[2]),
            vec!["0", "42", "0.00", "0", "0", "0.00", "0", "0", "0", "0", "0", "0", "0"]
        );
    }

    #[test]
    fn columns_line_up() {
        let observations = vec![observation("2", busy(), None), observation("31337", busy(), None)];
        let table = Reporter::default().render_table(&observations);
        let name_starts: Vec<usize> = table.lines().map(|l| l.rfind("  ").unwrap()).collect();
        assert!(name_starts.windows(2).all(|w| w[0] == w[1]), "{table}");
        assert!(table.lines().nth(1).unwrap().ends_with("  org.example.Server --port 8080"));
    }

    #[test]
    fn delta_rows_report_the_interval() {
        let prior = busy();
        let current = Metrics {
            cpu_time_nanos: prior.cpu_time_nanos + 1_000_000_000,
            gc_time_millis: prior.gc_time_millis + 300,
            ..prior
        };
        let rows = Reporter::default().rows(&[observation("9", current, Some(prior))]);
        assert_eq!(rows[0].health, Health::GcPressure);
        assert_eq!(rows[0].delta.gc_time_millis, 300);
        assert_eq!(rows[0].delta.cpu_time_millis, 1_000);
        assert!((rows[0].delta.gc_fraction - 0.3).abs() < 1e-12);
    }

    #[test]
    fn names_are_sanitized_and_truncated() {
        let snap = Snapshot::try_new("5", "evil\x1b[2Jname-that-is-long", busy()).unwrap();
        let observations = vec![Observation {
            id: "5".into(),
            current: snap,
            prior: None,
        }];
        let table = Reporter::new(Classifier::default(), 10).render_table(&observations);
        let row = table.lines().nth(1).unwrap();
        assert!(!row.contains('\x1b'));
        assert!(row.ends_with("  evil [2Jn\u{2026}"), "{row}");
    }

    #[test]
    fn huge_counters_render_saturated() {
        let huge = Metrics {
            heap_usage: MemoryUsage {
                init: 0,
                used: i64::MAX,
                committed: i64::MAX / 2 + 1,
                max: 1,
            },
            non_heap_usage: MemoryUsage {
                init: 0,
                used: 1,
                committed: i64::MAX / 2 + 1,
                max: UNAVAILABLE,
            },
            direct_buffer_bytes: i64::MAX,
            mapped_buffer_bytes: 1,
            ..busy()
        };
        let observations = vec![observation("7", huge, None), observation("8", busy(), None)];
        let reporter = Reporter::default();
        let table = reporter.render_table(&observations);
        let row: Vec<&str> = tokens(table.lines().nth(1).unwrap());
        assert_eq!(&row[..2], &["M", "7"]);
        assert_eq!(&row[6..9], &["8E", "8E", "1"]);
        assert_eq!(row[11], "8E");
        assert_eq!(reporter.render_compact(&observations), "M3");
    }

    #[test]
    fn compact_mode_is_one_char_per_process() {
        let fds = Metrics {
            open_file_descriptors: 501,
            ..busy()
        };
        let observations = vec![
            observation("2", busy(), None),
            observation("3", fds, None),
            Observation {
                id: "4".into(),
                current: ZERO.clone(),
                prior: None,
            },
        ];
        assert_eq!(Reporter::default().render_compact(&observations), "3F0");
        assert_eq!(Reporter::default().render_compact(&[]), "");
    }
}
