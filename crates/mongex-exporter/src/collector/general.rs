use std::sync::Arc;

use async_trait::async_trait;
use mongex_common::error::Result;
use mongex_metrics::{Labels, Metric};
use tracing::warn;

use super::base::{Batch, Fetch};
use crate::client::AdminClient;

pub struct GeneralFetcher {
    client: Arc<dyn AdminClient>,
}

impl GeneralFetcher {
    pub fn new(client: Arc<dyn AdminClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetch for GeneralFetcher {
    fn family(&self) -> &'static str {
        "general"
    }

    async fn fetch(&self) -> Result<Batch> {
        let up = match self.client.ping().await {
            Ok(()) => 1.0,
            Err(err) => {
                warn!(error = %err, "mongodb ping failed");
                0.0
            }
        };

        Ok(Batch::metrics(vec![Metric::gauge(
            "mongodb_up",
            "Whether MongoDB is up.",
            up,
            Labels::new(),
        )]))
    }
}
