use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use futures::{StreamExt, stream::FuturesUnordered};
use mongex_common::error::{MongexError, Result};
use tracing::warn;

use crate::{
    collector::Collector,
    types::{DescKey, Metric, MetricFamily, dedup},
};

#[derive(Default)]
pub struct Registry {
    collectors: Vec<Arc<dyn Collector>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            collectors: Vec::new(),
        }
    }

    pub fn register(&mut self, collector: Arc<dyn Collector>) -> Result<()> {
        if self
            .collectors
            .iter()
            .any(|existing| existing.name() == collector.name())
        {
            return Err(MongexError::InvalidArgument(format!(
                "collector already registered: {}",
                collector.name()
            )));
        }

        self.collectors.push(collector);
        Ok(())
    }

    pub fn collector_names(&self) -> Vec<String> {
        self.collectors
            .iter()
            .map(|collector| collector.name().to_string())
            .collect()
    }

    pub async fn gather(&self) -> Vec<MetricFamily> {
        let mut described: HashMap<usize, HashSet<DescKey>> = HashMap::new();
        let mut pending = FuturesUnordered::new();
        for (index, collector) in self.collectors.iter().enumerate() {
            let collector = Arc::clone(collector);
            pending.push(async move { (index, collector.describe().await) });
        }
        while let Some((index, descs)) = pending.next().await {
            described.insert(index, descs.iter().map(|desc| desc.key()).collect());
        }

        let mut pending = FuturesUnordered::new();
        for (index, collector) in self.collectors.iter().enumerate() {
            let collector = Arc::clone(collector);
            pending.push(async move { (index, collector.collect().await) });
        }

        let mut collected: Vec<(usize, Vec<Metric>)> = Vec::with_capacity(self.collectors.len());
        while let Some(result) = pending.next().await {
            collected.push(result);
        }
        collected.sort_by_key(|(index, _)| *index);

        let mut samples = Vec::new();
        for (index, metrics) in collected {
            let allowed = described.get(&index);
            for metric in metrics {
                if allowed.is_some_and(|keys| keys.contains(&metric.desc_key())) {
                    samples.push(metric);
                } else {
                    warn!(
                        collector = %self.collectors[index].name(),
                        metric = %metric.name,
                        "collected metric was not described, dropping it"
                    );
                }
            }
        }

        group_families(dedup(samples))
    }

    pub async fn render_prometheus(&self) -> String {
        render_prometheus(&self.gather().await)
    }
}

fn group_families(samples: Vec<Metric>) -> Vec<MetricFamily> {
    let mut families: BTreeMap<String, MetricFamily> = BTreeMap::new();

    for sample in samples {
        match families.get_mut(&sample.name) {
            Some(family) if family.metric_type != sample.metric_type => {
                warn!(
                    metric = %sample.name,
                    expected = family.metric_type.as_prometheus_type(),
                    found = sample.metric_type.as_prometheus_type(),
                    "conflicting metric types, dropping sample"
                );
            }
            Some(family) => family.samples.push(sample),
            None => {
                families.insert(
                    sample.name.clone(),
                    MetricFamily {
                        name: sample.name.clone(),
                        help: sample.help.clone(),
                        metric_type: sample.metric_type,
                        samples: vec![sample],
                    },
                );
            }
        }
    }

    families.into_values().collect()
}

pub fn render_prometheus(families: &[MetricFamily]) -> String {
    let mut output = String::new();

    for family in families {
        output.push_str("# HELP ");
        output.push_str(&family.name);
        output.push(' ');
        output.push_str(&escape_help(&family.help));
        output.push('\n');

        output.push_str("# TYPE ");
        output.push_str(&family.name);
        output.push(' ');
        output.push_str(family.metric_type.as_prometheus_type());
        output.push('\n');

        for sample in &family.samples {
            output.push_str(&render_sample_line(sample));
        }
    }

    output
}

fn render_sample_line(sample: &Metric) -> String {
    let mut rendered = String::new();
    rendered.push_str(&sample.name);

    if !sample.labels.is_empty() {
        rendered.push('{');
        for (index, (key, value)) in sample.labels.iter().enumerate() {
            if index > 0 {
                rendered.push(',');
            }
            rendered.push_str(key);
            rendered.push_str("=\"");
            rendered.push_str(&escape_label_value(value));
            rendered.push('"');
        }
        rendered.push('}');
    }

    rendered.push(' ');
    rendered.push_str(&format_metric_value(sample.value));
    rendered.push('\n');
    rendered
}

fn format_metric_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

fn escape_help(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('"', "\\\"")
}
