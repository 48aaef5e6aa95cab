use mongex_common::time::{minutes_ago, now};
use mongex_metrics::{Labels, Metric};
use mongodb::bson::{Bson, DateTime, Document, doc};
use tracing::warn;

use crate::{client::AdminClient, flatten::sanitize};

const LOCK_MODES: [(&str, &str); 4] =
    [("r", "read"), ("w", "write"), ("R", "READ"), ("W", "WRITE")];

const CHANGELOG_WINDOW_MINUTES: i64 = 10;
const CHANGELOG_EVENTS: [&str; 12] = [
    "moveChunk.start",
    "moveChunk.to",
    "moveChunk.to_failed",
    "moveChunk.from",
    "moveChunk.from_failed",
    "moveChunk.commit",
    "addShard",
    "removeShard.start",
    "shardCollection",
    "shardCollection.start",
    "split",
    "multi-split",
];

fn lookup<'a>(document: &'a Document, path: &[&str]) -> Option<&'a Bson> {
    let (last, parents) = path.split_last()?;
    let mut current = document;
    for key in parents {
        current = current.get_document(key).ok()?;
    }
    current.get(last)
}

fn number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(value) => Some(*value),
        Bson::Int32(value) => Some(f64::from(*value)),
        Bson::Int64(value) => Some(*value as f64),
        _ => None,
    }
}

fn label(key: &str, value: &str) -> Labels {
    Labels::from([(key.to_string(), value.to_string())])
}

/// `serverStatus.locks.<resource>.<stat>.<mode>` regrouped by statistic.
pub fn locks_metrics(data: &Document) -> Vec<Metric> {
    let Some(Bson::Document(locks)) = lookup(data, &["serverStatus", "locks"]) else {
        return Vec::new();
    };

    let mut metrics = Vec::new();
    for (resource, stats) in locks {
        let Bson::Document(stats) = stats else {
            continue;
        };
        for (stat, modes) in stats {
            let Bson::Document(modes) = modes else {
                continue;
            };
            for (mode, mode_name) in LOCK_MODES {
                let Some(value) = modes.get(mode).and_then(number) else {
                    continue;
                };
                let mut labels = label("resource", resource);
                labels.insert("lock_mode".to_string(), mode_name.to_string());
                metrics.push(Metric::counter(
                    format!("mongodb_locks_{}", sanitize(stat)),
                    format!("serverStatus.locks.{stat}"),
                    value,
                    labels,
                ));
            }
        }
    }

    metrics
}

pub fn global_lock_metrics(data: &Document) -> Vec<Metric> {
    let Some(Bson::Document(global_lock)) = lookup(data, &["serverStatus", "globalLock"]) else {
        return Vec::new();
    };

    let mut metrics = Vec::new();
    for (section, name) in [
        ("currentQueue", "mongodb_global_lock_current_queue"),
        ("activeClients", "mongodb_global_lock_client"),
    ] {
        let Ok(stats) = global_lock.get_document(section) else {
            continue;
        };
        for (key, kind) in [("readers", "reader"), ("writers", "writer")] {
            if let Some(value) = stats.get(key).and_then(number) {
                metrics.push(Metric::gauge(
                    name,
                    format!("serverStatus.globalLock.{section}"),
                    value,
                    label("type", kind),
                ));
            }
        }
    }

    if let Some(total) = global_lock.get("totalTime").and_then(number) {
        metrics.push(Metric::counter(
            "mongodb_global_lock_total",
            "serverStatus.globalLock.totalTime",
            total,
            Labels::new(),
        ));
    }

    metrics
}

pub fn cache_evicted_total(data: &Document) -> Option<Metric> {
    let Some(Bson::Document(cache)) = lookup(data, &["serverStatus", "wiredTiger", "cache"]) else {
        return None;
    };

    let modified = cache.get("modified pages evicted").and_then(number)?;
    let unmodified = cache.get("unmodified pages evicted").and_then(number)?;

    Some(Metric::counter(
        "mongodb_mongod_wiredtiger_cache_evicted_total",
        "WiredTiger cache evicted total",
        modified + unmodified,
        Labels::new(),
    ))
}

pub fn special_metrics(data: &Document) -> Vec<Metric> {
    let mut metrics = Vec::new();

    if let Some(Bson::String(version)) = lookup(data, &["serverStatus", "version"]) {
        metrics.push(Metric::gauge(
            "mongodb_version_info",
            "The server version",
            1.0,
            label("mongodb", version),
        ));
    }

    if let Some(Bson::String(engine)) = lookup(data, &["serverStatus", "storageEngine", "name"]) {
        metrics.push(Metric::gauge(
            "mongodb_mongod_storage_engine",
            "The storage engine used by the MongoDB instance",
            1.0,
            label("engine", engine),
        ));
    }

    if let Some(state) = lookup(data, &["replSetGetStatus", "myState"]).and_then(number) {
        let set = match lookup(data, &["replSetGetStatus", "set"]) {
            Some(Bson::String(set)) => set.as_str(),
            _ => "",
        };
        metrics.push(Metric::gauge(
            "mongodb_mongod_replset_my_state",
            "An integer between 0 and 10 that represents the replica state of the current member",
            state,
            label("set", set),
        ));
    }

    metrics
}

/// Rows of `{_id: {event, note}, count}` grouped from `config.changelog`.
pub fn changelog_metrics(rows: &[Document]) -> Vec<Metric> {
    let mut counts: Vec<(String, f64)> = CHANGELOG_EVENTS
        .iter()
        .map(|event| (event.to_string(), 0.0))
        .collect();

    for row in rows {
        let Ok(id) = row.get_document("_id") else {
            continue;
        };
        let Ok(event) = id.get_str("event") else {
            continue;
        };
        let count = row.get("count").and_then(number).unwrap_or_default();
        let note = id.get_str("note").unwrap_or_default();

        let event = match event {
            "moveChunk.to" | "moveChunk.from" if !note.is_empty() && note != "success" => {
                format!("{event}_failed")
            }
            _ => event.to_string(),
        };

        match counts.iter_mut().find(|(known, _)| *known == event) {
            Some((_, value)) => *value = count,
            None => counts.push((event, count)),
        }
    }

    counts
        .into_iter()
        .map(|(event, count)| {
            Metric::gauge(
                "mongodb_mongos_sharding_changelog_10min_total",
                "Total # of Cluster Balancer log events over the last 10 minutes",
                count,
                label("event", &event),
            )
        })
        .collect()
}

pub async fn mongos_metrics(client: &dyn AdminClient) -> Vec<Metric> {
    let mut metrics = Vec::new();

    let since = minutes_ago(now(), CHANGELOG_WINDOW_MINUTES);
    let pipeline = vec![
        doc! { "$match": { "time": { "$gt": DateTime::from_millis(since.timestamp_millis()) } } },
        doc! {
            "$group": {
                "_id": { "event": "$what", "note": "$details.note" },
                "count": { "$sum": 1 },
            }
        },
    ];
    match client.aggregate("config", "changelog", pipeline).await {
        Ok(rows) => metrics.extend(changelog_metrics(&rows)),
        Err(err) => warn!(error = %err, "cannot aggregate sharding changelog events"),
    }

    match client
        .find_one("config", "settings", doc! { "_id": "balancer" })
        .await
    {
        Ok(settings) => {
            let stopped = settings
                .as_ref()
                .and_then(|settings| settings.get_bool("stopped").ok())
                .unwrap_or(false);
            metrics.push(Metric::gauge(
                "mongodb_mongos_sharding_balancer_enabled",
                "Whether the cluster balancer is enabled",
                if stopped { 0.0 } else { 1.0 },
                Labels::new(),
            ));
        }
        Err(err) => warn!(error = %err, "cannot read balancer settings"),
    }

    for (collection, name, help) in [
        ("shards", "mongodb_mongos_sharding_shards_total", "Total # of shards"),
        ("chunks", "mongodb_mongos_sharding_chunks_total", "Total # of chunks"),
    ] {
        match client.run_command("config", doc! { "count": collection }).await {
            Ok(reply) => {
                if let Some(count) = reply.get("n").and_then(number) {
                    metrics.push(Metric::gauge(name, help, count, Labels::new()));
                }
            }
            Err(err) => warn!(collection, error = %err, "cannot count sharding documents"),
        }
    }

    metrics
}
