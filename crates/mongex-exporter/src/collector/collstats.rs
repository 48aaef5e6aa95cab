use std::sync::Arc;

use async_trait::async_trait;
use mongex_common::error::Result;
use mongodb::bson::{Document, doc};
use tracing::error;

use super::base::{Batch, Fetch, Fetched};
use crate::{
    client::AdminClient,
    namespace::{resolve_stats_namespaces, split_namespace},
};

const PREFIX: &str = "collstats";

pub struct CollStatsFetcher {
    client: Arc<dyn AdminClient>,
    namespaces: Vec<String>,
    discovering: bool,
    compatible: bool,
}

impl CollStatsFetcher {
    pub fn new(
        client: Arc<dyn AdminClient>,
        namespaces: Vec<String>,
        discovering: bool,
        compatible: bool,
    ) -> Self {
        Self {
            client,
            namespaces,
            discovering,
            compatible,
        }
    }

    fn pipeline(&self) -> Vec<Document> {
        let mut pipeline = vec![doc! {
            "$collStats": {
                "latencyStats": { "histograms": true },
                "storageStats": { "scale": 1 },
            }
        }];
        if !self.compatible {
            pipeline.push(doc! {
                "$project": {
                    "storageStats.wiredTiger": 0,
                    "storageStats.indexDetails": 0,
                }
            });
        }
        pipeline
    }
}

#[async_trait]
impl Fetch for CollStatsFetcher {
    fn family(&self) -> &'static str {
        "collstats"
    }

    async fn fetch(&self) -> Result<Batch> {
        let namespaces =
            resolve_stats_namespaces(self.client.as_ref(), &self.namespaces, self.discovering)
                .await?;

        let mut documents = Vec::new();
        for namespace in namespaces {
            let (database, collection) = split_namespace(&namespace);
            match self
                .client
                .aggregate(&database, &collection, self.pipeline())
                .await
            {
                Ok(rows) => documents.extend(rows.into_iter().map(|row| {
                    Fetched::new(PREFIX, row)
                        .with_label("database", &database)
                        .with_label("collection", &collection)
                })),
                Err(err) => {
                    error!(namespace = %namespace, error = %err, "cannot get $collStats");
                }
            }
        }

        Ok(Batch::documents(documents))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mongex_metrics::{Collector, Labels, Metric, MetricType};

    use super::*;
    use crate::{
        collector::base::CachingCollector,
        testing::MemoryServer,
        topology::{TopologyInfo, TopologyRole},
    };

    fn collstats_row(count: i64) -> Document {
        doc! {
            "ns": "db1.colA",
            "host": "localhost:27017",
            "latencyStats": {
                "reads": {
                    "latency": 120_i64,
                    "ops": 4_i64,
                    "histogram": [
                        { "micros": 16_i64, "count": 3_i64 },
                        { "micros": 32_i64, "count": 1_i64 },
                    ],
                },
            },
            "storageStats": { "size": 2048, "count": count, "totalIndexSize": 4096 },
        }
    }

    fn collector(
        server: Arc<MemoryServer>,
        namespaces: &[&str],
        discovering: bool,
        compatible: bool,
    ) -> CachingCollector<CollStatsFetcher> {
        CachingCollector::new(
            CollStatsFetcher::new(
                server,
                namespaces.iter().map(|ns| ns.to_string()).collect(),
                discovering,
                compatible,
            ),
            Arc::new(TopologyInfo {
                role: TopologyRole::Standalone,
                labels: Labels::new(),
            }),
            compatible,
            Duration::from_secs(5),
        )
    }

    fn find<'a>(metrics: &'a [Metric], name: &str) -> Vec<&'a Metric> {
        metrics.iter().filter(|metric| metric.name == name).collect()
    }

    #[tokio::test]
    async fn labels_every_namespace() {
        let server = MemoryServer::new();
        server.add_collection("db1", "colA", 10);
        server.add_collection("db2", "colB", 3);
        server.aggregation("db1", "colA", "$collStats", vec![collstats_row(10)]);
        server.aggregation("db2", "colB", "$collStats", vec![collstats_row(3)]);

        let collector = collector(server, &["db1.colA", "db2.colB"], false, false);
        collector.describe().await;
        let metrics = collector.collect().await;

        let counts = find(&metrics, "mongodb_collstats_storageStats_count");
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].labels["database"], "db1");
        assert_eq!(counts[0].labels["collection"], "colA");
        assert_eq!(counts[1].value, 3.0);

        let histogram = find(&metrics, "mongodb_collstats_latencyStats_reads_histogram_count");
        assert_eq!(histogram.len(), 4);
        assert_eq!(histogram[1].labels["index"], "1");
        assert_eq!(histogram[1].metric_type, MetricType::Gauge);
    }

    #[tokio::test]
    async fn compatible_mode_shortens_names() {
        let server = MemoryServer::new();
        server.add_collection("db1", "colA", 10);
        server.aggregation("db1", "colA", "$collStats", vec![collstats_row(10)]);

        let collector = collector(server, &["db1.colA"], false, true);
        collector.describe().await;
        let metrics = collector.collect().await;

        assert_eq!(find(&metrics, "mongodb_collstats_storage_count").len(), 1);
        assert_eq!(find(&metrics, "mongodb_collstats_latency_reads_ops").len(), 1);
    }

    #[tokio::test]
    async fn views_fail_the_fetch() {
        let server = MemoryServer::new();
        server.add_collection("db1", "colA", 10);
        server.add_view("db1", "summary");

        let collector = collector(server.clone(), &["db1.colA", "db1.summary"], false, false);
        assert!(collector.describe().await.is_empty());
        assert_eq!(server.calls("aggregate"), 0);
    }

    #[tokio::test]
    async fn discovering_mode_expands_databases() {
        let server = MemoryServer::new();
        server.add_collection("db1", "colA", 10);
        server.add_collection("db1", "colB", 10);
        server.add_view("db1", "summary");
        server.aggregation("db1", "colA", "$collStats", vec![collstats_row(10)]);
        server.aggregation("db1", "colB", "$collStats", vec![collstats_row(7)]);

        let collector = collector(server.clone(), &["db1"], true, false);
        collector.describe().await;
        let metrics = collector.collect().await;

        let counts = find(&metrics, "mongodb_collstats_storageStats_count");
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[1].labels["collection"], "colB");
        assert_eq!(server.calls("aggregate"), 2);
    }
}
