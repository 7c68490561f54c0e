//! HTTP surface: the ingestion trigger and the moderation API.

mod actor;
mod comments;
mod events;
mod trigger;

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::error::ServerError;
use crate::moderation::ModerationService;
use crate::pipeline::Ingestor;

pub use actor::RequestActor;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub ingestor: Ingestor,
    pub moderation: Arc<ModerationService>,
}

impl AppState {
    pub fn new(ingestor: Ingestor, moderation: Arc<ModerationService>) -> Self {
        Self {
            ingestor,
            moderation,
        }
    }
}

/// Builds the full router with request tracing.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(trigger::router())
        .merge(events::router())
        .merge(comments::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let body = self.to_response();
        let status = StatusCode::from_u16(body.code.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            debug!(code = ?body.code, error = %self, "Request rejected");
        }
        (status, Json(body)).into_response()
    }
}
