use std::sync::Arc;

use async_trait::async_trait;
use mongex_common::error::Result;
use mongodb::bson::doc;
use tracing::error;

use super::base::{Batch, Fetch, Fetched};
use crate::{
    client::AdminClient,
    namespace::{resolve_stats_namespaces, split_namespace},
};

const PREFIX: &str = "indexstats.accesses";

pub struct IndexStatsFetcher {
    client: Arc<dyn AdminClient>,
    namespaces: Vec<String>,
    discovering: bool,
}

impl IndexStatsFetcher {
    pub fn new(client: Arc<dyn AdminClient>, namespaces: Vec<String>, discovering: bool) -> Self {
        Self {
            client,
            namespaces,
            discovering,
        }
    }
}

#[async_trait]
impl Fetch for IndexStatsFetcher {
    fn family(&self) -> &'static str {
        "indexstats"
    }

    async fn fetch(&self) -> Result<Batch> {
        let namespaces =
            resolve_stats_namespaces(self.client.as_ref(), &self.namespaces, self.discovering)
                .await?;

        let mut documents = Vec::new();
        for namespace in namespaces {
            let (database, collection) = split_namespace(&namespace);
            let rows = match self
                .client
                .aggregate(&database, &collection, vec![doc! { "$indexStats": {} }])
                .await
            {
                Ok(rows) => rows,
                Err(err) => {
                    error!(namespace = %namespace, error = %err, "cannot get $indexStats");
                    continue;
                }
            };

            for row in rows {
                let Ok(key_name) = row.get_str("name") else {
                    continue;
                };
                let Ok(accesses) = row.get_document("accesses") else {
                    continue;
                };
                documents.push(
                    Fetched::new(PREFIX, accesses.clone())
                        .with_label("database", &database)
                        .with_label("collection", &collection)
                        .with_label("key_name", key_name),
                );
            }
        }

        Ok(Batch::documents(documents))
    }
}
