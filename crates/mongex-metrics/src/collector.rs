use async_trait::async_trait;

use crate::types::{Metric, MetricDesc};

/// Two-phase contract driven by the [`Registry`](crate::Registry): `describe`
/// runs first in every scrape, `collect` follows and must only emit samples
/// whose descriptors were advertised.
#[async_trait]
pub trait Collector: Send + Sync {
    fn name(&self) -> &str;
    async fn describe(&self) -> Vec<MetricDesc>;
    async fn collect(&self) -> Vec<Metric>;
}
