use mongex_common::error::Result;
use mongex_metrics::Labels;
use mongodb::bson::{Bson, Document, doc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::client::AdminClient;

const ARBITER_STATE: i64 = 7;

pub const LABEL_REPLSET_NAME: &str = "rs_nm";
pub const LABEL_CLUSTER_ROLE: &str = "cl_role";
pub const LABEL_CLUSTER_ID: &str = "cl_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TopologyRole {
    Standalone,
    Router,
    ReplsetMember,
    Arbiter,
    Unknown,
}

impl TopologyRole {
    pub fn has_replset_status(&self) -> bool {
        matches!(self, Self::ReplsetMember | Self::Arbiter)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TopologyInfo {
    pub role: TopologyRole,
    pub labels: Labels,
}

impl TopologyInfo {
    pub fn unknown() -> Self {
        Self {
            role: TopologyRole::Unknown,
            labels: Labels::new(),
        }
    }

    pub fn base_labels(&self) -> &Labels {
        &self.labels
    }

    pub fn is_arbiter(&self) -> bool {
        self.role == TopologyRole::Arbiter
    }

    pub async fn detect(client: &dyn AdminClient) -> Self {
        let hello = match hello(client).await {
            Ok(hello) => hello,
            Err(err) => {
                warn!(error = %err, "cannot identify the server topology");
                return Self::unknown();
            }
        };

        let mut role = classify(&hello);
        if role == TopologyRole::ReplsetMember && reports_arbiter_state(client).await {
            role = TopologyRole::Arbiter;
        }

        let mut labels = Labels::new();
        if let Ok(set_name) = hello.get_str("setName") {
            labels.insert(LABEL_REPLSET_NAME.to_string(), set_name.to_string());
        }

        let shard_identity = if role == TopologyRole::Router {
            None
        } else {
            client
                .find_one("admin", "system.version", doc! { "_id": "shardIdentity" })
                .await
                .ok()
                .flatten()
        };

        let cluster_role = if role == TopologyRole::Router {
            Some("mongos")
        } else if hello.contains_key("configsvr") {
            Some("configsvr")
        } else if shard_identity.is_some() {
            Some("shardsvr")
        } else {
            None
        };
        if let Some(cluster_role) = cluster_role {
            labels.insert(LABEL_CLUSTER_ROLE.to_string(), cluster_role.to_string());
        }

        if let Some(cluster_id) = cluster_id(client, shard_identity.as_ref()).await {
            labels.insert(LABEL_CLUSTER_ID.to_string(), cluster_id);
        }

        debug!(role = ?role, labels = ?labels, "topology identified");
        Self { role, labels }
    }
}

/// Role implied by a `hello`/`isMaster` reply alone.
pub fn classify(hello: &Document) -> TopologyRole {
    if hello.get_str("msg").is_ok_and(|msg| msg == "isdbgrid") {
        return TopologyRole::Router;
    }
    if hello.get_bool("arbiterOnly").unwrap_or(false) {
        return TopologyRole::Arbiter;
    }
    if hello.contains_key("setName") {
        return TopologyRole::ReplsetMember;
    }
    TopologyRole::Standalone
}

async fn hello(client: &dyn AdminClient) -> Result<Document> {
    match client.run_command("admin", doc! { "hello": 1 }).await {
        Ok(reply) => Ok(reply),
        Err(err) if err.is_connection() => Err(err),
        Err(err) => {
            debug!(error = %err, "hello failed, falling back to isMaster");
            client.run_command("admin", doc! { "isMaster": 1 }).await
        }
    }
}

async fn reports_arbiter_state(client: &dyn AdminClient) -> bool {
    let Ok(status) = client
        .run_command("admin", doc! { "replSetGetStatus": 1 })
        .await
    else {
        return false;
    };
    let Ok(members) = status.get_array("members") else {
        return false;
    };

    members.iter().any(|member| {
        let Bson::Document(member) = member else {
            return false;
        };
        member.get_bool("self").unwrap_or(false)
            && as_i64(member.get("state")) == Some(ARBITER_STATE)
    })
}

async fn cluster_id(client: &dyn AdminClient, shard_identity: Option<&Document>) -> Option<String> {
    if let Ok(Some(version)) = client.find_one("config", "version", Document::new()).await
        && let Some(id) = id_string(version.get("clusterId"))
    {
        return Some(id);
    }

    if let Some(id) = shard_identity.and_then(|identity| id_string(identity.get("clusterId"))) {
        return Some(id);
    }

    let config = client
        .run_command("admin", doc! { "replSetGetConfig": 1 })
        .await
        .ok()?;
    let settings = config.get_document("config").ok()?.get_document("settings").ok()?;
    id_string(settings.get("replicaSetId"))
}

fn id_string(value: Option<&Bson>) -> Option<String> {
    match value? {
        Bson::ObjectId(id) => Some(id.to_hex()),
        Bson::String(id) if !id.is_empty() => Some(id.clone()),
        _ => None,
    }
}

fn as_i64(value: Option<&Bson>) -> Option<i64> {
    match value? {
        Bson::Int32(value) => Some(i64::from(*value)),
        Bson::Int64(value) => Some(*value),
        Bson::Double(value) => Some(*value as i64),
        _ => None,
    }
}
