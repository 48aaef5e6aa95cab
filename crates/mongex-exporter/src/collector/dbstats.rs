use std::sync::Arc;

use async_trait::async_trait;
use mongex_common::error::Result;
use mongodb::bson::doc;
use tracing::error;

use super::base::{Batch, Fetch, Fetched};
use crate::{client::AdminClient, namespace::list_databases};

const PREFIX: &str = "dbstats";

pub struct DbStatsFetcher {
    client: Arc<dyn AdminClient>,
    namespaces: Vec<String>,
}

impl DbStatsFetcher {
    pub fn new(client: Arc<dyn AdminClient>, namespaces: Vec<String>) -> Self {
        Self { client, namespaces }
    }
}

#[async_trait]
impl Fetch for DbStatsFetcher {
    fn family(&self) -> &'static str {
        "dbstats"
    }

    async fn fetch(&self) -> Result<Batch> {
        let databases = list_databases(self.client.as_ref(), &self.namespaces, &[]).await?;

        let mut documents = Vec::with_capacity(databases.len());
        for database in databases {
            match self
                .client
                .run_command(&database, doc! { "dbStats": 1, "scale": 1 })
                .await
            {
                Ok(stats) => {
                    documents.push(Fetched::new(PREFIX, stats).with_label("database", database));
                }
                Err(err) => {
                    error!(database = %database, error = %err, "cannot get dbStats");
                }
            }
        }

        Ok(Batch::documents(documents))
    }
}
