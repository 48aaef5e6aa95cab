use std::collections::{BTreeMap, HashMap};

pub type Labels = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricType {
    Counter,
    Gauge,
    Untyped,
}

impl MetricType {
    pub fn as_prometheus_type(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Untyped => "untyped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescKey {
    pub name: String,
    pub label_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleKey {
    pub name: String,
    pub labels: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricDesc {
    pub name: String,
    pub help: String,
    pub metric_type: MetricType,
    pub label_keys: Vec<String>,
}

impl MetricDesc {
    pub fn key(&self) -> DescKey {
        DescKey {
            name: self.name.clone(),
            label_keys: self.label_keys.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub help: String,
    pub metric_type: MetricType,
    pub value: f64,
    pub labels: Labels,
}

impl Metric {
    pub fn new(
        name: impl Into<String>,
        help: impl Into<String>,
        metric_type: MetricType,
        value: f64,
        labels: Labels,
    ) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            metric_type,
            value,
            labels,
        }
    }

    pub fn gauge(
        name: impl Into<String>,
        help: impl Into<String>,
        value: f64,
        labels: Labels,
    ) -> Self {
        Self::new(name, help, MetricType::Gauge, value, labels)
    }

    pub fn counter(
        name: impl Into<String>,
        help: impl Into<String>,
        value: f64,
        labels: Labels,
    ) -> Self {
        Self::new(name, help, MetricType::Counter, value, labels)
    }

    pub fn desc(&self) -> MetricDesc {
        MetricDesc {
            name: self.name.clone(),
            help: self.help.clone(),
            metric_type: self.metric_type,
            label_keys: self.labels.keys().cloned().collect(),
        }
    }

    pub fn desc_key(&self) -> DescKey {
        DescKey {
            name: self.name.clone(),
            label_keys: self.labels.keys().cloned().collect(),
        }
    }

    pub fn key(&self) -> SampleKey {
        SampleKey {
            name: self.name.clone(),
            labels: self
                .labels
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }
    }
}

/// Samples sharing an identity collapse into one: the last value wins, the
/// first position is kept.
pub fn dedup(metrics: Vec<Metric>) -> Vec<Metric> {
    let mut positions: HashMap<SampleKey, usize> = HashMap::with_capacity(metrics.len());
    let mut unique: Vec<Metric> = Vec::with_capacity(metrics.len());

    for metric in metrics {
        let key = metric.key();
        match positions.get(&key) {
            Some(&index) => unique[index] = metric,
            None => {
                positions.insert(key, unique.len());
                unique.push(metric);
            }
        }
    }

    unique
}

#[derive(Debug, Clone)]
pub struct MetricFamily {
    pub name: String,
    pub help: String,
    pub metric_type: MetricType,
    pub samples: Vec<Metric>,
}
