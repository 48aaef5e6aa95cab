use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use tracing::error;

use super::ExporterApiError;
use crate::exporter::Exporter;

pub async fn prometheus_metrics(
    State(exporter): State<Arc<Exporter>>,
) -> Result<Response, ExporterApiError> {
    let payload = exporter.scrape().await.map_err(|err| {
        error!(kind = err.kind(), error = %err, "scrape failed");
        err
    })?;

    let mut response = Response::new(Body::from(payload));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );

    Ok(response)
}
