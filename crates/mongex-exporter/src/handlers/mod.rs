pub mod health;
pub mod metrics;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use mongex_common::error::MongexError;

pub struct ExporterApiError(pub MongexError);

impl From<MongexError> for ExporterApiError {
    fn from(value: MongexError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ExporterApiError {
    fn into_response(self) -> Response {
        let body = if self.0.is_connection() {
            format!("An error has occurred while connecting to MongoDB:\n\n{}", self.0)
        } else {
            format!("An error has occurred while scraping MongoDB:\n\n{}", self.0)
        };

        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}
