//! `GET /api/ingest`: runs the pipeline on demand.
//!
//! The scheduler calls it with `Authorization: Bearer <secret>`; a person can
//! use `?token=<secret>` instead.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use civicfeed_protocol::IngestionReport;
use serde::Deserialize;
use tracing::{info, warn};

use super::AppState;
use super::actor::bearer_token;
use crate::config::secret_matches;
use crate::error::{ServerError, ServerResult};

pub fn router() -> Router<AppState> {
    Router::new().route("/api/ingest", get(trigger))
}

#[derive(Debug, Default, Deserialize)]
struct TriggerQuery {
    token: Option<String>,
}

async fn trigger(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TriggerQuery>,
) -> ServerResult<Json<IngestionReport>> {
    let Some(secret) = state.ingestor.config().trigger_secret.as_deref() else {
        warn!("Ingestion trigger called but no secret is configured");
        return Err(ServerError::Unauthorized);
    };

    let supplied = bearer_token(&headers).or(query.token.as_deref());
    if !supplied.is_some_and(|token| secret_matches(secret, token)) {
        warn!("Ingestion trigger rejected");
        return Err(ServerError::Unauthorized);
    }

    info!("Ingestion triggered over HTTP");
    Ok(Json(state.ingestor.run().await))
}
