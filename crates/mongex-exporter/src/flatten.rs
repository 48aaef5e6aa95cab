use mongex_common::{error::MongexError, time::millis_to_seconds};
use mongex_metrics::{Labels, Metric, MetricType, dedup};
use mongodb::bson::{Bson, Document};

pub const METRIC_PREFIX: &str = "mongodb_";

const PATH_SEPARATOR: char = '.';
const POSITION_LABEL: &str = "index";
const MEMBER_LABEL: &str = "member_idx";
const MEMBER_STATE_LABEL: &str = "member_state";

// Longest prefixes first.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("serverStatus.wiredTiger.transaction", "ss_wt_txn"),
    ("serverStatus.wiredTiger", "ss_wt"),
    ("serverStatus", "ss"),
    ("replSetGetStatus", "rs"),
    ("systemMetrics", "sys"),
    ("local.oplog.rs.stats.wiredTiger", "oplog_stats_wt"),
    ("local.oplog.rs.stats", "oplog_stats"),
    ("collstats.storageStats.wiredTiger", "collstats_storage_wt"),
    ("collstats.storageStats.indexDetails", "collstats_storage_idx"),
    ("collstats.storageStats", "collstats_storage"),
    ("collstats.latencyStats", "collstats_latency"),
];

struct LegacySection {
    path: &'static str,
    name: &'static str,
    label: &'static str,
}

const LEGACY_SECTIONS: &[LegacySection] = &[
    LegacySection {
        path: "serverStatus.opcounters",
        name: "mongodb_op_counters_total",
        label: "type",
    },
    LegacySection {
        path: "serverStatus.opcountersRepl",
        name: "mongodb_op_counters_repl_total",
        label: "type",
    },
    LegacySection {
        path: "serverStatus.connections",
        name: "mongodb_connections",
        label: "state",
    },
    LegacySection {
        path: "serverStatus.asserts",
        name: "mongodb_asserts_total",
        label: "type",
    },
    LegacySection {
        path: "serverStatus.mem",
        name: "mongodb_memory",
        label: "type",
    },
    LegacySection {
        path: "serverStatus.metrics.document",
        name: "mongodb_mongod_metrics_document_total",
        label: "state",
    },
    LegacySection {
        path: "serverStatus.network",
        name: "mongodb_network_total",
        label: "type",
    },
];

const COUNTER_SECTIONS: &[&str] = &["opcounters", "opcountersRepl", "asserts", "metrics.document"];

#[derive(Debug, Default)]
pub struct Flattened {
    pub samples: Vec<Metric>,
    pub malformed: Vec<MongexError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scalar {
    Number,
    Instant,
    LogicalClock,
}

pub fn flatten(
    prefix: &str,
    document: &Document,
    base_labels: &Labels,
    compatible: bool,
) -> Flattened {
    let mut walker = Walker {
        compatible,
        samples: Vec::new(),
        malformed: Vec::new(),
    };
    walker.document(prefix, document, base_labels);

    Flattened {
        samples: dedup(walker.samples),
        malformed: walker.malformed,
    }
}

pub fn metric_name(path: &str, compatible: bool) -> String {
    let path = if compatible {
        abbreviate(path)
    } else {
        path.to_string()
    };
    format!("{METRIC_PREFIX}{}", sanitize(&path))
}

pub fn sanitize(raw: &str) -> String {
    let mut sanitized = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '$' => {}
            ch if ch.is_ascii_alphanumeric() => sanitized.push(ch),
            _ => {
                if !sanitized.ends_with('_') {
                    sanitized.push('_');
                }
            }
        }
    }
    sanitized.trim_matches('_').to_string()
}

struct Walker {
    compatible: bool,
    samples: Vec<Metric>,
    malformed: Vec<MongexError>,
}

impl Walker {
    fn document(&mut self, path: &str, document: &Document, labels: &Labels) {
        for (key, value) in document {
            let next = join_path(path, key);
            match value {
                Bson::Document(nested) => self.document(&next, nested, labels),
                Bson::Array(items) => self.array(&next, items, labels),
                scalar => self.scalar(path, key, &next, scalar, labels),
            }
        }
    }

    fn scalar(&mut self, parent: &str, key: &str, path: &str, value: &Bson, labels: &Labels) {
        let Some((number, scalar)) = self.classify(path, value) else {
            return;
        };

        if self.compatible
            && let Some(section) = LEGACY_SECTIONS.iter().find(|section| section.path == parent)
        {
            let mut labels = labels.clone();
            labels.insert(section.label.to_string(), key.to_string());
            let metric_type = if section.name.ends_with("_total") {
                MetricType::Counter
            } else {
                MetricType::Gauge
            };
            self.samples
                .push(Metric::new(section.name, path, metric_type, number, labels));
            return;
        }

        self.emit(path, path, scalar, number, labels.clone());
    }

    fn array(&mut self, path: &str, items: &[Bson], labels: &Labels) {
        for (index, item) in items.iter().enumerate() {
            match item {
                Bson::Document(element) => {
                    let mut element_labels = labels.clone();
                    match element.get("name") {
                        Some(Bson::String(name)) => {
                            element_labels.insert(free_label(labels, MEMBER_LABEL), name.clone());
                            if let Some(Bson::String(state)) = element.get("stateStr") {
                                element_labels
                                    .insert(free_label(labels, MEMBER_STATE_LABEL), state.clone());
                            }
                        }
                        _ => {
                            element_labels
                                .insert(free_label(labels, POSITION_LABEL), index.to_string());
                        }
                    }
                    self.document(path, element, &element_labels);
                }
                Bson::Array(nested) => {
                    self.array(&join_path(path, &index.to_string()), nested, labels);
                }
                scalar => {
                    let indexed = join_path(path, &index.to_string());
                    let Some((number, kind)) = self.classify(&indexed, scalar) else {
                        continue;
                    };

                    if self.compatible {
                        self.emit(&indexed, &indexed, kind, number, labels.clone());
                    } else {
                        let mut element_labels = labels.clone();
                        element_labels
                            .insert(free_label(labels, POSITION_LABEL), index.to_string());
                        self.emit(path, &indexed, kind, number, element_labels);
                    }
                }
            }
        }
    }

    fn emit(&mut self, name_path: &str, help: &str, scalar: Scalar, value: f64, labels: Labels) {
        let name = metric_name(name_path, self.compatible);
        if name.len() == METRIC_PREFIX.len() {
            self.malformed.push(MongexError::MalformedField {
                path: help.to_string(),
                reason: "key does not produce a valid metric name".to_string(),
            });
            return;
        }

        self.samples.push(Metric::new(
            name,
            help,
            infer_type(name_path, scalar),
            value,
            labels,
        ));
    }

    fn classify(&mut self, path: &str, value: &Bson) -> Option<(f64, Scalar)> {
        let unsupported = match value {
            Bson::Double(value) => return Some((*value, Scalar::Number)),
            Bson::Int32(value) => return Some((f64::from(*value), Scalar::Number)),
            Bson::Int64(value) => return Some((*value as f64, Scalar::Number)),
            Bson::Boolean(value) => return Some((if *value { 1.0 } else { 0.0 }, Scalar::Number)),
            Bson::DateTime(value) => {
                return Some((millis_to_seconds(value.timestamp_millis()), Scalar::Instant));
            }
            Bson::Timestamp(value) => return Some((f64::from(value.time), Scalar::LogicalClock)),
            Bson::String(_) | Bson::Null | Bson::ObjectId(_) => return None,
            Bson::Document(_) | Bson::Array(_) => "nested value in scalar position",
            Bson::Decimal128(_) => "decimal128",
            Bson::Binary(_) => "binary",
            Bson::RegularExpression(_) => "regular expression",
            Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) => "javascript",
            Bson::Symbol(_) => "symbol",
            Bson::Undefined => "undefined",
            Bson::MinKey | Bson::MaxKey => "min/max key",
            Bson::DbPointer(_) => "db pointer",
        };

        self.malformed.push(MongexError::MalformedField {
            path: path.to_string(),
            reason: format!("don't know how to handle {unsupported} values"),
        });
        None
    }
}

fn infer_type(path: &str, scalar: Scalar) -> MetricType {
    if scalar == Scalar::LogicalClock {
        return MetricType::Untyped;
    }
    if scalar == Scalar::Instant {
        return MetricType::Gauge;
    }

    let (parent, key) = match path.rsplit_once(PATH_SEPARATOR) {
        Some((parent, key)) => (parent, key),
        None => ("", path),
    };

    let lowered = key.to_ascii_lowercase();
    let cumulative = lowered.len() > "total".len() && lowered.ends_with("total");
    let in_counter_section = COUNTER_SECTIONS.iter().any(|section| {
        parent == *section
            || parent
                .strip_suffix(section)
                .is_some_and(|rest| rest.ends_with(PATH_SEPARATOR))
    });

    if cumulative || in_counter_section {
        MetricType::Counter
    } else {
        MetricType::Gauge
    }
}

fn abbreviate(path: &str) -> String {
    for (long, short) in ABBREVIATIONS {
        if let Some(rest) = path.strip_prefix(long)
            && (rest.is_empty() || rest.starts_with(PATH_SEPARATOR))
        {
            return format!("{short}{rest}");
        }
    }
    path.to_string()
}

fn join_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}{PATH_SEPARATOR}{key}")
    }
}

fn free_label(labels: &Labels, base: &str) -> String {
    if !labels.contains_key(base) {
        return base.to_string();
    }
    (2..)
        .map(|suffix| format!("{base}{suffix}"))
        .find(|candidate| !labels.contains_key(candidate))
        .unwrap_or_else(|| base.to_string())
}
