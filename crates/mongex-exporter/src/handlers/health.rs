use std::sync::Arc;

use axum::{Json, extract::State};

use super::ExporterApiError;
use crate::{exporter::Exporter, topology::TopologyInfo};

pub async fn health(
    State(exporter): State<Arc<Exporter>>,
) -> Result<Json<TopologyInfo>, ExporterApiError> {
    Ok(Json(exporter.topology().await?))
}
