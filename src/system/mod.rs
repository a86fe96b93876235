pub mod collector;
pub mod hotspot;
pub mod perfdata;
pub mod source;

pub use collector::{Collector, Observation, Sample};
pub use hotspot::HotspotSource;
pub use source::{FetchError, MetricSource};
