use std::sync::Arc;

use async_trait::async_trait;
use mongex_common::error::{MongexError, Result};
use mongex_metrics::Metric;
use mongodb::bson::doc;

use super::base::{Batch, Fetch, Fetched};
use crate::{
    client::AdminClient,
    special::{
        cache_evicted_total, global_lock_metrics, locks_metrics, mongos_metrics, special_metrics,
    },
    topology::{TopologyInfo, TopologyRole},
};

pub struct DiagnosticDataFetcher {
    client: Arc<dyn AdminClient>,
    topology: Arc<TopologyInfo>,
    compatible: bool,
}

impl DiagnosticDataFetcher {
    pub fn new(
        client: Arc<dyn AdminClient>,
        topology: Arc<TopologyInfo>,
        compatible: bool,
    ) -> Self {
        Self {
            client,
            topology,
            compatible,
        }
    }
}

#[async_trait]
impl Fetch for DiagnosticDataFetcher {
    fn family(&self) -> &'static str {
        "diagnosticdata"
    }

    async fn fetch(&self) -> Result<Batch> {
        let reply = match self
            .client
            .run_command("admin", doc! { "getDiagnosticData": 1 })
            .await
        {
            Ok(reply) => reply,
            Err(_) if self.topology.is_arbiter() => return Err(MongexError::ArbiterSkip),
            Err(err) => return Err(err),
        };

        let data = reply.get_document("data").map_err(|_| {
            MongexError::command("getDiagnosticData", "response has no data document")
        })?;

        let mut batch = Batch::documents(vec![Fetched::new("", data.clone())]);
        if self.compatible && self.topology.role == TopologyRole::Router {
            batch.metrics = mongos_metrics(self.client.as_ref()).await;
        }

        Ok(batch)
    }

    fn augment(&self, documents: &[Fetched]) -> Vec<Metric> {
        let mut metrics = Vec::new();
        for fetched in documents {
            metrics.extend(locks_metrics(&fetched.document));
            metrics.extend(global_lock_metrics(&fetched.document));

            if self.compatible {
                metrics.extend(cache_evicted_total(&fetched.document));
                metrics.extend(special_metrics(&fetched.document));
            }
        }
        metrics
    }
}
