//! Route handlers

pub mod health;
pub mod task;

use axum::{http::StatusCode, Json, Router};
use serde::Serialize;
use taskhub_core::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Offending request field, for validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
}

pub type RouteError = (StatusCode, Json<ErrorResponse>);

/// Map a core error onto an HTTP status and JSON body
pub fn route_error(error: Error) -> RouteError {
    let status = match &error {
        Error::TaskNotFound(_) => StatusCode::NOT_FOUND,
        Error::Validation { .. } => StatusCode::BAD_REQUEST,
        Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Database(_) | Error::Storage(_) | Error::System(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        tracing::error!(error = %error, "Request failed");
    }

    (
        status,
        Json(ErrorResponse {
            field: error.field(),
            error: error.to_string(),
        }),
    )
}

/// Assemble the full REST application
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(task::router())
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
