pub mod collector;
pub mod process;
pub mod registry;
pub mod types;

pub use collector::Collector;
pub use process::ProcessCollector;
pub use registry::{Registry, render_prometheus};
pub use types::{DescKey, Labels, Metric, MetricDesc, MetricFamily, MetricType, SampleKey, dedup};
