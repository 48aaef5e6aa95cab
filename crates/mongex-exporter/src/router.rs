use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::{exporter::Exporter, handlers};

pub const HEALTH_PATH: &str = "/health";

pub fn exporter_router(exporter: Arc<Exporter>) -> Router {
    let metrics_path = exporter.opts().metrics_path.clone();

    Router::new()
        .route(&metrics_path, get(handlers::metrics::prometheus_metrics))
        .route(HEALTH_PATH, get(handlers::health::health))
        .layer(TraceLayer::new_for_http())
        .with_state(exporter)
}
