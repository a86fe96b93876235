use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::Instrument;

use super::source::MetricSource;
use crate::health::{Snapshot, ZERO};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(2);

/// One process's snapshot from a single pass. Unreachable processes carry
/// [`ZERO`], so the identifier is kept alongside.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub id: String,
    pub snapshot: Snapshot,
}

/// A process's current snapshot paired with the one from an earlier pass.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub id: String,
    pub current: Snapshot,
    pub prior: Option<Snapshot>,
}

impl Observation {
    /// The prior snapshot, or [`ZERO`] for lifetime totals.
    pub fn baseline(&self) -> &Snapshot {
        self.prior.as_ref().unwrap_or(&ZERO)
    }
}

impl From<Sample> for Observation {
    fn from(sample: Sample) -> Self {
        Observation {
            id: sample.id,
            current: sample.snapshot,
            prior: None,
        }
    }
}

pub struct Collector {
    source: Arc<dyn MetricSource>,
    fetch_timeout: Duration,
}

impl Collector {
    pub fn new(source: Arc<dyn MetricSource>) -> Self {
        Collector {
            source,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Identifiers to fetch, in display order, never including our own.
    /// Listing walks the filesystem, so it runs on a blocking thread.
    pub async fn target_ids(&self, selected: Option<&str>) -> Vec<String> {
        let source = Arc::clone(&self.source);
        let listing = tokio::task::spawn_blocking(move || {
            (
                source.list_process_identifiers(),
                source.current_process_identifier(),
            )
        });
        let (listed, own) = match listing.await {
            Ok(listing) => listing,
            Err(err) => {
                tracing::warn!(%err, "process listing panicked");
                return Vec::new();
            }
        };
        let mut ids: Vec<String> = listed
            .into_iter()
            .filter(|id| own.as_deref() != Some(id.as_str()))
            .filter(|id| selected.is_none_or(|wanted| wanted == id.as_str()))
            .collect();
        ids.sort_by(|a, b| display_order(a, b));
        ids
    }

    /// One pass over every target. Each fetch is isolated: a failure,
    /// panic or timeout yields [`ZERO`] for that process only.
    pub async fn collect(&self, selected: Option<&str>) -> Vec<Sample> {
        let ids = self.target_ids(selected).await;
        let span = tracing::debug_span!("collector.collect", targets = ids.len());
        join_all(ids.into_iter().map(|id| self.fetch(id)))
            .instrument(span)
            .await
    }

    /// Lifetime-cumulative view: a single pass without priors.
    pub async fn observe(&self, selected: Option<&str>) -> Vec<Observation> {
        self.collect(selected)
            .await
            .into_iter()
            .map(Observation::from)
            .collect()
    }

    /// Two passes `interval` apart, matched by identifier. Processes that
    /// vanished are dropped; new or previously unreachable ones get no prior.
    pub async fn observe_delta(
        &self,
        selected: Option<&str>,
        interval: Duration,
    ) -> Vec<Observation> {
        let first = self.collect(selected).await;
        tokio::time::sleep(interval).await;
        let second = self.collect(selected).await;

        let mut priors: HashMap<String, Snapshot> = first
            .into_iter()
            .filter(|sample| !sample.snapshot.is_zero())
            .map(|sample| (sample.id, sample.snapshot))
            .collect();

        second
            .into_iter()
            .map(|sample| Observation {
                prior: priors.remove(&sample.id),
                id: sample.id,
                current: sample.snapshot,
            })
            .collect()
    }

    async fn fetch(&self, id: String) -> Sample {
        let source = Arc::clone(&self.source);
        let task_id = id.clone();
        let task = tokio::task::spawn_blocking(move || source.fetch_snapshot(&task_id));

        let snapshot = match tokio::time::timeout(self.fetch_timeout, task).await {
            Ok(Ok(Ok(snapshot))) => snapshot,
            Ok(Ok(Err(err))) => {
                tracing::debug!(%id, %err, "metrics unavailable");
                ZERO.clone()
            }
            Ok(Err(err)) => {
                tracing::warn!(%id, %err, "metric fetch panicked");
                ZERO.clone()
            }
            Err(_) => {
                tracing::warn!(%id, timeout = ?self.fetch_timeout, "metric fetch timed out");
                ZERO.clone()
            }
        };
        Sample { id, snapshot }
    }
}

/// Numeric identifiers ascending, then anything non-numeric by text.
pub fn display_order(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
