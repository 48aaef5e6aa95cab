use std::sync::Arc;

use async_trait::async_trait;
use mongex_common::error::{MongexError, Result};
use mongodb::bson::doc;

use super::base::{Batch, Fetch, Fetched};
use crate::{client::AdminClient, topology::TopologyInfo};

const PREFIX: &str = "replSetGetStatus";

pub struct ReplSetStatusFetcher {
    client: Arc<dyn AdminClient>,
    topology: Arc<TopologyInfo>,
}

impl ReplSetStatusFetcher {
    pub fn new(client: Arc<dyn AdminClient>, topology: Arc<TopologyInfo>) -> Self {
        Self { client, topology }
    }
}

#[async_trait]
impl Fetch for ReplSetStatusFetcher {
    fn family(&self) -> &'static str {
        "replicasetstatus"
    }

    async fn fetch(&self) -> Result<Batch> {
        let status = match self
            .client
            .run_command("admin", doc! { "replSetGetStatus": 1 })
            .await
        {
            Ok(status) => status,
            Err(_) if self.topology.is_arbiter() => return Err(MongexError::ArbiterSkip),
            Err(err) => return Err(err),
        };

        Ok(Batch::documents(vec![Fetched::new(PREFIX, status)]))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mongex_common::error::ERR_NO_REPLICATION_ENABLED;
    use mongex_metrics::{Collector, Labels};

    use super::*;
    use crate::{
        collector::base::CachingCollector,
        testing::{MemoryServer, Reply},
        topology::TopologyRole,
    };

    fn collector(
        server: Arc<MemoryServer>,
        role: TopologyRole,
    ) -> CachingCollector<ReplSetStatusFetcher> {
        let topology = Arc::new(TopologyInfo {
            role,
            labels: Labels::from([("rs_nm".to_string(), "rs0".to_string())]),
        });
        CachingCollector::new(
            ReplSetStatusFetcher::new(server, Arc::clone(&topology)),
            topology,
            false,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn members_are_labelled() {
        let server = MemoryServer::new();
        server.reply(
            "replSetGetStatus",
            Reply::Ok(doc! {
                "set": "rs0",
                "myState": 1,
                "members": [
                    {
                        "_id": 0,
                        "name": "a:27017",
                        "stateStr": "PRIMARY",
                        "health": 1.0,
                        "uptime": 50,
                    },
                    {
                        "_id": 1,
                        "name": "b:27017",
                        "stateStr": "SECONDARY",
                        "health": 0.0,
                        "uptime": 20,
                    },
                ],
                "ok": 1.0,
            }),
        );

        let collector = collector(server, TopologyRole::ReplsetMember);
        collector.describe().await;
        let metrics = collector.collect().await;

        let health: Vec<_> = metrics
            .iter()
            .filter(|metric| metric.name == "mongodb_replSetGetStatus_members_health")
            .collect();
        assert_eq!(health.len(), 2);
        assert_eq!(health[1].labels["member_idx"], "b:27017");
        assert_eq!(health[1].labels["member_state"], "SECONDARY");
        assert_eq!(health[1].labels["rs_nm"], "rs0");
        assert_eq!(health[1].value, 0.0);
    }

    #[tokio::test]
    async fn replication_not_enabled_is_silent() {
        let server = MemoryServer::new();
        server.reply(
            "replSetGetStatus",
            Reply::Failed {
                code: Some(ERR_NO_REPLICATION_ENABLED),
                message: "not running with --replSet".to_string(),
            },
        );

        let fetcher = ReplSetStatusFetcher::new(
            server.clone(),
            Arc::new(TopologyInfo {
                role: TopologyRole::ReplsetMember,
                labels: Labels::new(),
            }),
        );
        let err = fetcher.fetch().await.unwrap_err();
        assert!(err.is_silent());

        let collector = collector(server, TopologyRole::Arbiter);
        assert!(collector.describe().await.is_empty());
        assert!(collector.collect().await.is_empty());
    }
}
