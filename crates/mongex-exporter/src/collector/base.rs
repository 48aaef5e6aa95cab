use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use mongex_common::error::{MongexError, Result};
use mongex_metrics::{Collector, Labels, Metric, MetricDesc, dedup};
use mongodb::bson::Document;
use tokio::sync::Mutex;
use tracing::{Level, debug, enabled, error};

use crate::{flatten::flatten, topology::TopologyInfo};

const SCRAPE_TIME_METRIC: &str = "mongodb_collector_scrape_time_ms";

/// A raw document plus where it goes in the metric namespace.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub prefix: String,
    pub document: Document,
    pub labels: Labels,
}

impl Fetched {
    pub fn new(prefix: impl Into<String>, document: Document) -> Self {
        Self {
            prefix: prefix.into(),
            document,
            labels: Labels::new(),
        }
    }

    pub fn with_label(mut self, key: &str, value: impl Into<String>) -> Self {
        self.labels.insert(key.to_string(), value.into());
        self
    }
}

/// Everything one fetch produced: documents to flatten and ready-made samples.
#[derive(Debug, Default)]
pub struct Batch {
    pub documents: Vec<Fetched>,
    pub metrics: Vec<Metric>,
}

impl Batch {
    pub fn documents(documents: Vec<Fetched>) -> Self {
        Self {
            documents,
            metrics: Vec::new(),
        }
    }

    pub fn metrics(metrics: Vec<Metric>) -> Self {
        Self {
            documents: Vec::new(),
            metrics,
        }
    }
}

#[async_trait]
pub trait Fetch: Send + Sync {
    fn family(&self) -> &'static str;

    async fn fetch(&self) -> Result<Batch>;

    fn augment(&self, _documents: &[Fetched]) -> Vec<Metric> {
        Vec::new()
    }
}

#[derive(Debug, Default)]
pub enum CacheState {
    #[default]
    Empty,
    Populated(Vec<Metric>),
}

pub struct CachingCollector<F> {
    fetcher: F,
    topology: Arc<TopologyInfo>,
    compatible: bool,
    timeout: Duration,
    cache: Mutex<CacheState>,
}

impl<F: Fetch> CachingCollector<F> {
    pub fn new(
        fetcher: F,
        topology: Arc<TopologyInfo>,
        compatible: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            topology,
            compatible,
            timeout,
            cache: Mutex::new(CacheState::Empty),
        }
    }

    fn build(&self, batch: Batch, elapsed: Duration) -> Vec<Metric> {
        let family = self.fetcher.family();
        let base_labels = self.topology.base_labels();
        let mut metrics = Vec::new();

        for fetched in &batch.documents {
            if enabled!(Level::DEBUG) {
                debug!(
                    collector = family,
                    prefix = %fetched.prefix,
                    document = %serde_json::to_string(&fetched.document).unwrap_or_default(),
                    "raw document"
                );
            }

            let mut labels = base_labels.clone();
            labels.extend(fetched.labels.clone());

            let flattened = flatten(&fetched.prefix, &fetched.document, &labels, self.compatible);
            for malformed in &flattened.malformed {
                debug!(collector = family, error = %malformed, "skipping field");
            }
            metrics.extend(flattened.samples);
        }

        let mut extra = batch.metrics;
        extra.extend(self.fetcher.augment(&batch.documents));
        for mut metric in extra {
            for (key, value) in base_labels {
                metric
                    .labels
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
            metrics.push(metric);
        }

        let mut labels = Labels::new();
        labels.insert("collector".to_string(), family.to_string());
        labels.insert("exporter".to_string(), "mongodb".to_string());
        metrics.push(Metric::gauge(
            SCRAPE_TIME_METRIC,
            "Time taken for scrape by collector",
            elapsed.as_secs_f64() * 1000.0,
            labels,
        ));

        dedup(metrics)
    }

    fn report(&self, err: &MongexError) {
        let family = self.fetcher.family();
        if err.is_silent() || self.topology.is_arbiter() {
            debug!(collector = family, error = %err, "no metrics from collector");
        } else {
            error!(collector = family, error = %err, "collector fetch failed");
        }
    }
}

#[async_trait]
impl<F: Fetch> Collector for CachingCollector<F> {
    fn name(&self) -> &str {
        self.fetcher.family()
    }

    async fn describe(&self) -> Vec<MetricDesc> {
        let mut cache = self.cache.lock().await;
        *cache = CacheState::Empty;

        let started = Instant::now();
        let batch = match tokio::time::timeout(self.timeout, self.fetcher.fetch()).await {
            Ok(Ok(batch)) => batch,
            Ok(Err(err)) => {
                self.report(&err);
                return Vec::new();
            }
            Err(_) => {
                self.report(&MongexError::Timeout(self.timeout));
                return Vec::new();
            }
        };

        let metrics = self.build(batch, started.elapsed());

        let mut seen = HashSet::new();
        let descs: Vec<MetricDesc> = metrics
            .iter()
            .filter(|metric| seen.insert(metric.desc_key()))
            .map(Metric::desc)
            .collect();

        *cache = CacheState::Populated(metrics);
        descs
    }

    async fn collect(&self) -> Vec<Metric> {
        match &*self.cache.lock().await {
            CacheState::Empty => Vec::new(),
            CacheState::Populated(metrics) => metrics.clone(),
        }
    }
}
