use std::sync::Arc;

use async_trait::async_trait;
use mongex_common::error::Result;
use mongex_metrics::{Labels, Metric};
use mongodb::bson::{Bson, Document, Regex as BsonRegex, doc};
use tracing::{error, warn};

use super::base::{Batch, Fetch, Fetched};
use crate::{
    client::{AdminClient, DatabaseFilter},
    namespace::list_all_collections,
};

const PREFIX: &str = "sharded collection chunks";

/// `collStats` field, metric suffix and help.
const COLLECTION_STATUS: [(&str, &str, &str); 6] = [
    ("size", "size", "The total size in memory of all records in a collection"),
    ("count", "count", "The number of objects or documents in this collection"),
    (
        "avgObjSize",
        "avgobjsize",
        "The average size of an object in the collection (plus any padding)",
    ),
    (
        "storageSize",
        "storage_size",
        "The total amount of storage allocated to this collection for document storage",
    ),
    ("nindexes", "indexes", "The number of indexes on the collection"),
    ("totalIndexSize", "indexes_size", "The total size of all indexes"),
];

pub struct ShardedFetcher {
    client: Arc<dyn AdminClient>,
}

impl ShardedFetcher {
    pub fn new(client: Arc<dyn AdminClient>) -> Self {
        Self { client }
    }

    async fn sharded_collections(&self, database: &str) -> Result<Vec<Document>> {
        let pattern = BsonRegex {
            pattern: format!("^{}\\.", regex::escape(database)),
            options: "i".to_string(),
        };
        let rows = self
            .client
            .aggregate("config", "collections", vec![doc! { "$match": { "_id": pattern } }])
            .await?;

        let prefix = format!("{database}.");
        Ok(rows
            .into_iter()
            .filter(|row| !row.get_bool("dropped").unwrap_or(false))
            .filter(|row| row.get_str("_id").is_ok_and(|id| id.starts_with(&prefix)))
            .collect())
    }

    async fn chunks_per_shard(&self, collection: &Document) -> Result<Vec<Document>> {
        let predicate = match (collection.get("timestamp"), collection.get("uuid")) {
            (Some(_), Some(uuid)) => doc! { "uuid": uuid.clone() },
            _ => doc! { "ns": collection.get("_id").cloned().unwrap_or(Bson::Null) },
        };

        self.client
            .aggregate(
                "config",
                "chunks",
                vec![
                    doc! { "$match": predicate },
                    doc! { "$group": { "_id": "$shard", "cnt": { "$sum": 1 } } },
                    doc! { "$project": { "_id": 0, "shard": "$_id", "nChunks": "$cnt" } },
                    doc! { "$sort": { "shard": 1 } },
                ],
            )
            .await
    }

    /// `mongodb_mongos_db_coll_*{db, coll}` for every collection the router can see.
    async fn collection_status(&self) -> Vec<Metric> {
        let namespaces = match list_all_collections(self.client.as_ref(), &[], &[]).await {
            Ok(namespaces) => namespaces,
            Err(err) => {
                warn!(error = %err, "cannot list collections, skipping collection status");
                return Vec::new();
            }
        };

        let mut metrics = Vec::new();
        for (database, collections) in &namespaces {
            for collection in collections {
                let command = doc! { "collStats": collection.as_str(), "scale": 1 };
                let stats = match self.client.run_command(database, command).await {
                    Ok(stats) => stats,
                    Err(err) => {
                        warn!(
                            database = %database,
                            collection = %collection,
                            error = %err,
                            "cannot get collStats"
                        );
                        continue;
                    }
                };

                let mut labels = Labels::new();
                labels.insert("db".to_string(), database.clone());
                labels.insert("coll".to_string(), collection.clone());
                for (field, suffix, help) in COLLECTION_STATUS {
                    let value = match stats.get(field) {
                        Some(Bson::Int32(value)) => f64::from(*value),
                        Some(Bson::Int64(value)) => *value as f64,
                        Some(Bson::Double(value)) => *value,
                        _ => 0.0,
                    };
                    metrics.push(Metric::gauge(
                        format!("mongodb_mongos_db_coll_{suffix}"),
                        help,
                        value,
                        labels.clone(),
                    ));
                }
            }
        }

        metrics
    }
}

#[async_trait]
impl Fetch for ShardedFetcher {
    fn family(&self) -> &'static str {
        "sharded"
    }

    async fn fetch(&self) -> Result<Batch> {
        let databases = self
            .client
            .list_database_names(&DatabaseFilter::default())
            .await?;

        let mut documents = Vec::new();
        for database in databases {
            let collections = match self.sharded_collections(&database).await {
                Ok(collections) => collections,
                Err(err) => {
                    error!(database = %database, error = %err, "cannot list sharded collections");
                    continue;
                }
            };

            for collection in collections {
                let Ok(namespace) = collection.get_str("_id") else {
                    continue;
                };
                let name = namespace
                    .strip_prefix(&format!("{database}."))
                    .unwrap_or(namespace)
                    .to_string();

                let chunks = match self.chunks_per_shard(&collection).await {
                    Ok(chunks) => chunks,
                    Err(err) => {
                        error!(namespace, error = %err, "cannot count chunks in config.chunks");
                        continue;
                    }
                };

                for chunk in chunks {
                    let Ok(shard) = chunk.get_str("shard") else {
                        continue;
                    };
                    let Some(count) = chunk.get("nChunks").cloned() else {
                        continue;
                    };
                    documents.push(
                        Fetched::new(PREFIX, doc! { "count": count })
                            .with_label("database", &database)
                            .with_label("collection", &name)
                            .with_label("shard", shard),
                    );
                }
            }
        }

        Ok(Batch {
            documents,
            metrics: self.collection_status().await,
        })
    }
}
