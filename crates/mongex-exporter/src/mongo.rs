use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::TryStreamExt;
use mongex_common::error::{MongexError, Result};
use mongodb::{
    Client,
    bson::{Document, doc},
    error::{Error as DriverError, ErrorKind},
    options::ClientOptions,
};
use tracing::debug;

use crate::client::{AdminClient, CollectionFilter, Connector, DatabaseFilter};

const APP_NAME: &str = "mongex";

pub struct MongoConnector {
    timeout: Duration,
}

impl MongoConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn AdminClient>> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|err| MongexError::Connection(err.to_string()))?;
        options.direct_connection = Some(true);
        options.app_name = Some(APP_NAME.to_string());
        options.server_selection_timeout = Some(self.timeout);
        options.connect_timeout = Some(self.timeout);

        let client = Client::with_options(options)
            .map_err(|err| MongexError::Connection(err.to_string()))?;
        let client = MongoClient { client };
        client.ping().await.map_err(|err| match err {
            MongexError::Connection(_) => err,
            other => MongexError::Connection(other.to_string()),
        })?;

        debug!("connected to mongodb");
        Ok(Arc::new(client))
    }
}

pub struct MongoClient {
    client: Client,
}

#[async_trait]
impl AdminClient for MongoClient {
    async fn run_command(&self, database: &str, command: Document) -> Result<Document> {
        let name = command
            .keys()
            .next()
            .cloned()
            .unwrap_or_else(|| "command".to_string());

        self.client
            .database(database)
            .run_command(command)
            .await
            .map_err(|err| map_driver_error(&name, err))
    }

    async fn list_database_names(&self, filter: &DatabaseFilter) -> Result<Vec<String>> {
        self.client
            .list_database_names()
            .filter(filter.to_document())
            .authorized_databases(true)
            .await
            .map_err(|err| map_driver_error("listDatabases", err))
    }

    async fn list_collection_names(
        &self,
        database: &str,
        filter: &CollectionFilter,
    ) -> Result<Vec<String>> {
        self.client
            .database(database)
            .list_collection_names()
            .filter(filter.to_document())
            .await
            .map_err(|err| map_driver_error("listCollections", err))
    }

    async fn aggregate(
        &self,
        database: &str,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>> {
        let cursor = self
            .client
            .database(database)
            .collection::<Document>(collection)
            .aggregate(pipeline)
            .await
            .map_err(|err| map_driver_error("aggregate", err))?;

        cursor
            .try_collect()
            .await
            .map_err(|err| map_driver_error("aggregate", err))
    }

    async fn find_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>> {
        self.client
            .database(database)
            .collection::<Document>(collection)
            .find_one(filter)
            .await
            .map_err(|err| map_driver_error("find", err))
    }

    async fn ping(&self) -> Result<()> {
        self.run_command("admin", doc! { "ping": 1 }).await.map(|_| ())
    }

    async fn shutdown(&self) {
        self.client.clone().shutdown().await;
    }
}

fn map_driver_error(command: &str, err: DriverError) -> MongexError {
    match err.kind.as_ref() {
        ErrorKind::Command(command_error) => MongexError::Command {
            command: command.to_string(),
            code: Some(command_error.code),
            message: command_error.message.clone(),
        },
        ErrorKind::ServerSelection { .. }
        | ErrorKind::Authentication { .. }
        | ErrorKind::DnsResolve { .. }
        | ErrorKind::Io(_)
        | ErrorKind::ConnectionPoolCleared { .. } => MongexError::Connection(err.to_string()),
        _ => MongexError::command(command, err.to_string()),
    }
}
