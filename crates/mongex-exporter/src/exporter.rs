use std::{sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use mongex_common::{
    error::{MongexError, Result},
    time::now,
};
use mongex_metrics::{Collector, ProcessCollector, Registry};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::{
    client::{AdminClient, Connector},
    collector::{
        CachingCollector, CollStatsFetcher, DbStatsFetcher, DiagnosticDataFetcher, Fetch,
        GeneralFetcher, IndexStatsFetcher, ReplSetStatusFetcher, ShardedFetcher,
    },
    namespace::non_system_collections_count,
    opts::ExporterOpts,
    topology::{TopologyInfo, TopologyRole},
};

#[derive(Clone)]
pub struct Connection {
    pub client: Arc<dyn AdminClient>,
    pub topology: Arc<TopologyInfo>,
}

pub struct Exporter {
    opts: ExporterOpts,
    connector: Arc<dyn Connector>,
    shared: OnceCell<Connection>,
    started_at: Instant,
    boot_time: DateTime<Utc>,
}

impl Exporter {
    pub async fn new(opts: ExporterOpts, connector: Arc<dyn Connector>) -> Self {
        let exporter = Self {
            opts,
            connector,
            shared: OnceCell::new(),
            started_at: Instant::now(),
            boot_time: now(),
        };

        if exporter.opts.global_conn_pool
            && let Err(err) = exporter.shared_connection().await
        {
            warn!(error = %err, "cannot connect to mongodb, retrying on the next scrape");
        }

        exporter
    }

    pub fn opts(&self) -> &ExporterOpts {
        &self.opts
    }

    pub async fn scrape(&self) -> Result<String> {
        let connection = self.connection().await?;

        let rendered = match self.registry(&connection).await {
            Ok(registry) => Ok(registry.render_prometheus().await),
            Err(err) => Err(err),
        };

        if !self.opts.global_conn_pool {
            connection.client.shutdown().await;
        }

        rendered
    }

    pub async fn topology(&self) -> Result<TopologyInfo> {
        let connection = self.connection().await?;
        let topology = connection.topology.as_ref().clone();

        if !self.opts.global_conn_pool {
            connection.client.shutdown().await;
        }

        Ok(topology)
    }

    pub async fn registry(&self, connection: &Connection) -> Result<Registry> {
        let opts = &self.opts;
        let client = &connection.client;
        let topology = &connection.topology;

        let mut registry = Registry::new();
        registry.register(Arc::new(ProcessCollector::new(self.started_at, self.boot_time)))?;
        registry.register(self.caching(GeneralFetcher::new(Arc::clone(client)), topology))?;

        if opts.enable_diagnostic_data {
            registry.register(self.caching(
                DiagnosticDataFetcher::new(
                    Arc::clone(client),
                    Arc::clone(topology),
                    opts.compatible_mode,
                ),
                topology,
            ))?;
        }

        if opts.enable_replicaset_status && topology.role.has_replset_status() {
            registry.register(self.caching(
                ReplSetStatusFetcher::new(Arc::clone(client), Arc::clone(topology)),
                topology,
            ))?;
        }

        if opts.enable_dbstats {
            registry.register(self.caching(
                DbStatsFetcher::new(Arc::clone(client), opts.dbstats_namespaces.clone()),
                topology,
            ))?;
        }

        let wants_stats =
            !opts.collstats_namespaces.is_empty() || !opts.indexstats_namespaces.is_empty();
        if wants_stats && self.within_collstats_limit(client.as_ref()).await {
            if !opts.collstats_namespaces.is_empty() {
                registry.register(self.caching(
                    CollStatsFetcher::new(
                        Arc::clone(client),
                        opts.collstats_namespaces.clone(),
                        opts.discovering_mode,
                        opts.compatible_mode,
                    ),
                    topology,
                ))?;
            }

            if !opts.indexstats_namespaces.is_empty() {
                registry.register(self.caching(
                    IndexStatsFetcher::new(
                        Arc::clone(client),
                        opts.indexstats_namespaces.clone(),
                        opts.discovering_mode,
                    ),
                    topology,
                ))?;
            }
        }

        if opts.enable_sharded && topology.role == TopologyRole::Router {
            registry.register(self.caching(ShardedFetcher::new(Arc::clone(client)), topology))?;
        }

        debug!(collectors = ?registry.collector_names(), "registry ready");
        Ok(registry)
    }

    fn caching<F: Fetch + 'static>(
        &self,
        fetcher: F,
        topology: &Arc<TopologyInfo>,
    ) -> Arc<dyn Collector> {
        Arc::new(CachingCollector::new(
            fetcher,
            Arc::clone(topology),
            self.opts.compatible_mode,
            self.opts.timeout,
        ))
    }

    async fn within_collstats_limit(&self, client: &dyn AdminClient) -> bool {
        let limit = self.opts.collstats_limit;
        if limit == 0 {
            return true;
        }

        let count = non_system_collections_count(client, &[], &[]);
        match tokio::time::timeout(self.opts.timeout, count).await {
            Ok(Ok(count)) if count > limit => {
                warn!(count, limit, "too many collections, skipping collstats and indexstats");
                false
            }
            Ok(Ok(_)) => true,
            Ok(Err(err)) => {
                warn!(error = %err, "cannot count collections for the collstats limit");
                true
            }
            Err(_) => {
                warn!(
                    timeout = ?self.opts.timeout,
                    "collection count timed out, skipping collstats and indexstats"
                );
                false
            }
        }
    }

    async fn connect(&self) -> Result<Connection> {
        let timeout = self.opts.timeout;
        let client = tokio::time::timeout(timeout, self.connector.connect(&self.opts.uri))
            .await
            .map_err(|_| MongexError::Timeout(timeout))
            .and_then(|connected| connected)
            .map_err(|err| match err {
                MongexError::Connection(_) => err,
                other => MongexError::Connection(other.to_string()),
            })?;

        let detection = TopologyInfo::detect(client.as_ref());
        let topology = match tokio::time::timeout(timeout, detection).await {
            Ok(topology) => topology,
            Err(_) => {
                warn!(timeout = ?timeout, "topology detection timed out");
                TopologyInfo::unknown()
            }
        };
        let topology = Arc::new(topology);

        Ok(Connection { client, topology })
    }

    async fn shared_connection(&self) -> Result<Connection> {
        self.shared
            .get_or_try_init(|| self.connect())
            .await
            .cloned()
    }

    async fn connection(&self) -> Result<Connection> {
        if self.opts.global_conn_pool {
            self.shared_connection().await
        } else {
            self.connect().await
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::atomic::Ordering, time::Duration};

    use mongodb::bson::doc;

    use super::*;
    use crate::testing::{
        MemoryConnector, MemoryServer, Reply, hello_replset, hello_router, hello_standalone,
    };

    fn diagnostic_reply() -> mongodb::bson::Document {
        doc! {
            "data": { "serverStatus": { "uptime": 42.0, "connections": { "current": 5 } } },
            "ok": 1.0,
        }
    }

    async fn start(
        server: &Arc<MemoryServer>,
        opts: ExporterOpts,
    ) -> (Exporter, Arc<MemoryConnector>) {
        let connector = Arc::new(MemoryConnector::new(Arc::clone(server)));
        let exporter = Exporter::new(opts, connector.clone()).await;
        (exporter, connector)
    }

    async fn collector_names(exporter: &Exporter) -> Vec<String> {
        let connection = exporter.connect().await.unwrap();
        exporter.registry(&connection).await.unwrap().collector_names()
    }

    #[tokio::test]
    async fn standalone_scrape_renders_metrics() {
        let server = MemoryServer::new();
        server.reply("hello", Reply::Ok(hello_standalone()));
        server.reply("getDiagnosticData", Reply::Ok(diagnostic_reply()));

        let (exporter, _) = start(&server, ExporterOpts::default()).await;
        let body = exporter.scrape().await.unwrap();

        assert!(body.contains("mongodb_up 1\n"));
        assert!(body.contains("mongodb_serverStatus_uptime 42\n"));
        assert!(body.contains("# TYPE mongodb_serverStatus_connections_current gauge\n"));
        assert!(body.contains("process_start_time_seconds"));
        assert!(body.contains(
            "mongodb_collector_scrape_time_ms{collector=\"diagnosticdata\",exporter=\"mongodb\"}"
        ));

        assert_eq!(
            collector_names(&exporter).await,
            vec!["process", "general", "diagnosticdata"]
        );
    }

    #[tokio::test]
    async fn collectors_follow_topology_and_options() {
        let server = MemoryServer::new();
        server.reply("hello", Reply::Ok(hello_replset("rs0")));

        let opts = ExporterOpts {
            enable_dbstats: true,
            enable_sharded: true,
            collstats_namespaces: vec!["db1.colA".to_string()],
            ..ExporterOpts::default()
        };
        let (exporter, _) = start(&server, opts.clone()).await;
        assert_eq!(
            collector_names(&exporter).await,
            vec!["process", "general", "diagnosticdata", "replicasetstatus", "dbstats", "collstats"]
        );

        let router = MemoryServer::new();
        router.reply("hello", Reply::Ok(hello_router()));
        let opts = ExporterOpts {
            enable_diagnostic_data: false,
            ..opts
        };
        let (exporter, _) = start(&router, opts).await;
        assert_eq!(
            collector_names(&exporter).await,
            vec!["process", "general", "dbstats", "collstats", "sharded"]
        );
    }

    #[tokio::test]
    async fn collstats_limit_skips_stats_collectors() {
        let server = MemoryServer::new();
        server.reply("hello", Reply::Ok(hello_standalone()));
        for index in 0..6 {
            server.add_collection("db1", &format!("col{index}"), 1);
        }

        let opts = ExporterOpts {
            collstats_namespaces: vec!["db1.col0".to_string()],
            indexstats_namespaces: vec!["db1.col1".to_string()],
            collstats_limit: 5,
            ..ExporterOpts::default()
        };
        let (exporter, _) = start(&server, opts.clone()).await;
        assert_eq!(collector_names(&exporter).await, vec!["process", "general", "diagnosticdata"]);

        let (exporter, _) = start(&server, ExporterOpts { collstats_limit: 6, ..opts }).await;
        assert_eq!(
            collector_names(&exporter).await,
            vec!["process", "general", "diagnosticdata", "collstats", "indexstats"]
        );
    }

    #[tokio::test]
    async fn dbstats_end_to_end() {
        let server = MemoryServer::new();
        server.reply("hello", Reply::Ok(hello_standalone()));
        server.add_collection("testdb", "testcol_00", 10);
        server.reply(
            "dbStats",
            Reply::Ok(doc! {
                "db": "testdb",
                "collections": 3,
                "views": 0,
                "objects": 3000_i64,
                "avgObjSize": 32.5,
                "dataSize": 97500.0,
                "indexes": 4,
                "ok": 1.0,
            }),
        );

        let opts = ExporterOpts {
            enable_dbstats: true,
            enable_diagnostic_data: false,
            ..ExporterOpts::default()
        };
        let (exporter, _) = start(&server, opts).await;
        let body = exporter.scrape().await.unwrap();

        assert!(body.contains("mongodb_dbstats_collections{database=\"testdb\"} 3\n"));
        assert!(body.contains("mongodb_dbstats_objects{database=\"testdb\"} 3000\n"));
        assert!(body.contains("mongodb_dbstats_avgObjSize{database=\"testdb\"} 32.5\n"));
        assert!(body.contains("mongodb_dbstats_indexes{database=\"testdb\"} 4\n"));
        assert!(!body.contains("mongodb_dbstats_db"));
    }

    #[tokio::test]
    async fn stalled_topology_detection_does_not_hang_the_scrape() {
        let server = MemoryServer::new();
        server.reply("hello", Reply::Hang);

        let opts = ExporterOpts {
            timeout: Duration::from_millis(50),
            ..ExporterOpts::default()
        };
        let (exporter, _) = start(&server, opts).await;

        let body = tokio::time::timeout(Duration::from_secs(2), exporter.scrape())
            .await
            .expect("scrape must finish within the deadline")
            .unwrap();
        assert!(body.contains("mongodb_up 1\n"));
        assert!(body.contains("collector=\"general\""));
        assert_eq!(server.calls("isMaster"), 0);

        let topology = tokio::time::timeout(Duration::from_secs(2), exporter.topology())
            .await
            .expect("health must finish within the deadline")
            .unwrap();
        assert_eq!(topology.role, TopologyRole::Unknown);
        assert!(topology.labels.is_empty());
    }

    #[tokio::test]
    async fn stalled_collection_count_skips_stats_collectors() {
        let server = MemoryServer::new();
        server.reply("hello", Reply::Ok(hello_standalone()));
        server.reply("listDatabases", Reply::Hang);

        let opts = ExporterOpts {
            collstats_namespaces: vec!["db1.col0".to_string()],
            collstats_limit: 5,
            timeout: Duration::from_millis(50),
            ..ExporterOpts::default()
        };
        let (exporter, _) = start(&server, opts).await;

        let names = tokio::time::timeout(Duration::from_secs(2), collector_names(&exporter))
            .await
            .expect("registry must be built within the deadline");
        assert_eq!(names, vec!["process", "general", "diagnosticdata"]);
    }

    #[tokio::test]
    async fn hanging_fetch_reduces_the_scrape() {
        let server = MemoryServer::new();
        server.reply("hello", Reply::Ok(hello_standalone()));
        server.reply("getDiagnosticData", Reply::Hang);
        server.add_collection("testdb", "testcol_00", 10);

        let opts = ExporterOpts {
            enable_dbstats: true,
            timeout: Duration::from_millis(50),
            ..ExporterOpts::default()
        };
        let (exporter, _) = start(&server, opts).await;

        let body = tokio::time::timeout(Duration::from_secs(2), exporter.scrape())
            .await
            .expect("scrape must finish within the deadline")
            .unwrap();
        assert!(body.contains("mongodb_up 1\n"));
        assert!(body.contains("mongodb_dbstats_objects{database=\"testdb\"} 10\n"));
        assert!(body.contains("process_start_time_seconds"));
        assert!(body.contains("collector=\"dbstats\""));
        assert!(!body.contains("collector=\"diagnosticdata\""));
        assert!(!body.contains("mongodb_serverStatus"));
    }

    #[tokio::test]
    async fn per_request_connections_are_closed() {
        let server = MemoryServer::new();
        server.reply("hello", Reply::Ok(hello_standalone()));

        let (exporter, connector) = start(&server, ExporterOpts::default()).await;
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);

        exporter.scrape().await.unwrap();
        exporter.scrape().await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert_eq!(server.shutdowns(), 2);
        assert_eq!(server.calls("hello"), 2);
    }

    #[tokio::test]
    async fn shared_pool_connects_once() {
        let server = MemoryServer::new();
        server.reply("hello", Reply::Ok(hello_standalone()));

        let opts = ExporterOpts {
            global_conn_pool: true,
            ..ExporterOpts::default()
        };
        let (exporter, connector) = start(&server, opts).await;
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);

        exporter.scrape().await.unwrap();
        exporter.scrape().await.unwrap();
        exporter.topology().await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert_eq!(server.calls("hello"), 1);
        assert_eq!(server.shutdowns(), 0);
    }

    #[tokio::test]
    async fn unreachable_server_aborts_the_scrape() {
        let server = MemoryServer::new();
        let connector = Arc::new(MemoryConnector::unreachable(Arc::clone(&server)));
        let exporter = Exporter::new(ExporterOpts::default(), connector).await;

        let err = exporter.scrape().await.unwrap_err();
        assert!(err.is_connection());
        assert!(exporter.topology().await.unwrap_err().is_connection());
    }
}
