use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use mongex_common::error::{MongexError, Result};
use mongodb::bson::{Document, doc};

use crate::client::{AdminClient, CollectionFilter, Connector, DatabaseFilter};

#[derive(Debug, Clone)]
pub enum Reply {
    Ok(Document),
    Failed { code: Option<i32>, message: String },
    Unreachable,
    Hang,
}

#[derive(Debug, Clone, Default)]
struct MemCollection {
    is_view: bool,
    documents: usize,
    indexes: usize,
}

/// In-memory stand-in for a mongod/mongos used by unit tests.
#[derive(Default)]
pub struct MemoryServer {
    databases: Mutex<BTreeMap<String, BTreeMap<String, MemCollection>>>,
    commands: Mutex<HashMap<String, Reply>>,
    aggregations: Mutex<HashMap<(String, String, String), Vec<Document>>>,
    documents: Mutex<HashMap<(String, String), Document>>,
    calls: Mutex<HashMap<String, usize>>,
    shutdowns: AtomicUsize,
}

impl MemoryServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_collection(&self, database: &str, collection: &str, documents: usize) {
        self.insert_collection(database, collection, documents, false);
    }

    pub fn add_view(&self, database: &str, view: &str) {
        self.insert_collection(database, view, 0, true);
    }

    pub fn reply(&self, command: &str, reply: Reply) {
        if let Ok(mut commands) = self.commands.lock() {
            commands.insert(command.to_string(), reply);
        }
    }

    pub fn aggregation(&self, database: &str, collection: &str, stage: &str, rows: Vec<Document>) {
        if let Ok(mut aggregations) = self.aggregations.lock() {
            aggregations.insert(
                (database.to_string(), collection.to_string(), stage.to_string()),
                rows,
            );
        }
    }

    pub fn document(&self, database: &str, collection: &str, document: Document) {
        if let Ok(mut documents) = self.documents.lock() {
            documents.insert((database.to_string(), collection.to_string()), document);
        }
    }

    pub fn calls(&self, name: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(name).copied().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    fn insert_collection(&self, database: &str, collection: &str, documents: usize, is_view: bool) {
        if let Ok(mut databases) = self.databases.lock() {
            databases.entry(database.to_string()).or_default().insert(
                collection.to_string(),
                MemCollection {
                    is_view,
                    documents,
                    indexes: if is_view { 0 } else { 1 },
                },
            );
        }
    }

    fn scripted(&self, name: &str) -> Option<Reply> {
        self.commands
            .lock()
            .ok()
            .and_then(|commands| commands.get(name).cloned())
    }

    fn coll_stats(&self, database: &str, collection: &str) -> Document {
        let coll = match self.databases.lock() {
            Ok(databases) => databases
                .get(database)
                .and_then(|collections| collections.get(collection))
                .cloned()
                .unwrap_or_default(),
            Err(_) => return Document::new(),
        };

        doc! {
            "ns": format!("{database}.{collection}"),
            "size": (coll.documents * 33) as i64,
            "count": coll.documents as i64,
            "avgObjSize": 33,
            "storageSize": 4096_i64,
            "nindexes": coll.indexes as i32,
            "totalIndexSize": (coll.indexes * 4096) as i64,
            "ok": 1.0,
        }
    }

    fn record(&self, name: &str) {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(name.to_string()).or_default() += 1;
        }
    }

    fn db_stats(&self, database: &str) -> Document {
        let databases = match self.databases.lock() {
            Ok(guard) => guard,
            Err(_) => return Document::new(),
        };
        let collections = databases.get(database).cloned().unwrap_or_default();
        let physical = collections.values().filter(|coll| !coll.is_view);
        let objects: usize = physical.clone().map(|coll| coll.documents).sum();
        let indexes: usize = physical.clone().map(|coll| coll.indexes).sum();

        doc! {
            "db": database,
            "collections": physical.count() as i32,
            "views": collections.values().filter(|coll| coll.is_view).count() as i32,
            "objects": objects as i64,
            "avgObjSize": 33.0,
            "dataSize": (objects * 33) as f64,
            "indexes": indexes as i32,
            "scaleFactor": 1,
            "ok": 1.0,
        }
    }
}

#[async_trait]
impl AdminClient for MemoryServer {
    async fn run_command(&self, database: &str, command: Document) -> Result<Document> {
        let name = command.keys().next().cloned().unwrap_or_default();
        self.record(&name);

        let reply = self.scripted(&name);

        match reply {
            Some(Reply::Ok(document)) => Ok(document),
            Some(reply) => Err(failure(&name, reply).await),
            None if name == "dbStats" => Ok(self.db_stats(database)),
            None if name == "collStats" => {
                let collection = command.get_str("collStats").unwrap_or_default();
                Ok(self.coll_stats(database, collection))
            }
            None if name == "ping" => Ok(doc! { "ok": 1.0 }),
            None => Err(MongexError::command(name, "no such command")),
        }
    }

    async fn list_database_names(&self, filter: &DatabaseFilter) -> Result<Vec<String>> {
        self.record("listDatabases");
        if let Some(reply) = self.scripted("listDatabases") {
            return Err(failure("listDatabases", reply).await);
        }
        let databases = self.databases.lock().map_err(|_| poisoned("listDatabases"))?;
        Ok(databases
            .keys()
            .filter(|name| filter.matches(name))
            .cloned()
            .collect())
    }

    async fn list_collection_names(
        &self,
        database: &str,
        filter: &CollectionFilter,
    ) -> Result<Vec<String>> {
        self.record("listCollections");
        let databases = self.databases.lock().map_err(|_| poisoned("listCollections"))?;
        Ok(databases
            .get(database)
            .map(|collections| {
                collections
                    .iter()
                    .filter(|(name, coll)| filter.matches(name, coll.is_view))
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn aggregate(
        &self,
        database: &str,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>> {
        self.record("aggregate");
        let stage = pipeline
            .first()
            .and_then(|stage| stage.keys().next().cloned())
            .unwrap_or_default();
        let aggregations = self.aggregations.lock().map_err(|_| poisoned("aggregate"))?;
        Ok(aggregations
            .get(&(database.to_string(), collection.to_string(), stage))
            .cloned()
            .unwrap_or_default())
    }

    async fn find_one(
        &self,
        database: &str,
        collection: &str,
        _filter: Document,
    ) -> Result<Option<Document>> {
        self.record("find");
        let documents = self.documents.lock().map_err(|_| poisoned("find"))?;
        Ok(documents
            .get(&(database.to_string(), collection.to_string()))
            .cloned())
    }

    async fn ping(&self) -> Result<()> {
        self.run_command("admin", doc! { "ping": 1 }).await.map(|_| ())
    }

    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Error for a scripted non-`Ok` reply; `Hang` never resolves.
async fn failure(name: &str, reply: Reply) -> MongexError {
    match reply {
        Reply::Failed { code, message } => MongexError::Command {
            command: name.to_string(),
            code,
            message,
        },
        Reply::Unreachable => MongexError::Connection("connection refused".into()),
        Reply::Hang => std::future::pending().await,
        Reply::Ok(_) => MongexError::command(name, "unexpected reply"),
    }
}

fn poisoned(name: &str) -> MongexError {
    MongexError::command(name, "memory server lock poisoned")
}

pub struct MemoryConnector {
    pub server: Arc<MemoryServer>,
    pub reachable: bool,
    pub connects: AtomicUsize,
}

impl MemoryConnector {
    pub fn new(server: Arc<MemoryServer>) -> Self {
        Self {
            server,
            reachable: true,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn unreachable(server: Arc<MemoryServer>) -> Self {
        Self {
            reachable: false,
            ..Self::new(server)
        }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, _uri: &str) -> Result<Arc<dyn AdminClient>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.reachable {
            return Err(MongexError::Connection("server selection timeout".into()));
        }
        Ok(Arc::clone(&self.server) as Arc<dyn AdminClient>)
    }
}

pub fn hello_standalone() -> Document {
    doc! { "isWritablePrimary": true, "maxWireVersion": 17, "ok": 1.0 }
}

pub fn hello_replset(set_name: &str) -> Document {
    doc! {
        "isWritablePrimary": true,
        "setName": set_name,
        "hosts": ["127.0.0.1:27017"],
        "me": "127.0.0.1:27017",
        "ok": 1.0,
    }
}

pub fn hello_arbiter(set_name: &str) -> Document {
    doc! {
        "isWritablePrimary": false,
        "secondary": false,
        "arbiterOnly": true,
        "setName": set_name,
        "me": "127.0.0.1:27019",
        "ok": 1.0,
    }
}

pub fn hello_router() -> Document {
    doc! { "isWritablePrimary": true, "msg": "isdbgrid", "ok": 1.0 }
}
