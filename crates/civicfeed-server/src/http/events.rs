//! Event routes: listing, organizer submissions, reports and status changes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use civicfeed_core::{OrganizerSubmission, Report};
use civicfeed_protocol::{CreateReportRequest, EventStatusRequest, EventView, ReportReceipt};
use uuid::Uuid;

use super::AppState;
use super::actor::RequestActor;
use crate::error::ServerResult;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/events", get(list_events).post(create_event))
        .route("/api/events/{id}", get(get_event))
        .route("/api/events/{id}/reports", post(submit_report).get(list_reports))
        .route("/api/events/{id}/status", post(set_status))
}

/// GET /api/events
async fn list_events(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
) -> ServerResult<Json<Vec<EventView>>> {
    let events = state.moderation.list_events(&actor).await?;
    Ok(Json(
        events
            .into_iter()
            .map(|event| EventView::for_actor(event, &actor))
            .collect(),
    ))
}

/// POST /api/events
async fn create_event(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Json(submission): Json<OrganizerSubmission>,
) -> ServerResult<(StatusCode, Json<EventView>)> {
    let event = state
        .moderation
        .create_organizer_event(&actor, submission)
        .await?;
    Ok((StatusCode::CREATED, Json(EventView::for_actor(event, &actor))))
}

/// GET /api/events/{id}
async fn get_event(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(id): Path<Uuid>,
) -> ServerResult<Json<EventView>> {
    let event = state.moderation.get_event(&actor, id).await?;
    Ok(Json(EventView::for_actor(event, &actor)))
}

/// POST /api/events/{id}/reports
async fn submit_report(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(id): Path<Uuid>,
    Json(request): Json<CreateReportRequest>,
) -> ServerResult<(StatusCode, Json<ReportReceipt>)> {
    let receipt = state
        .moderation
        .submit_report(&actor, id, request.reason, request.details)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// GET /api/events/{id}/reports
async fn list_reports(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(id): Path<Uuid>,
) -> ServerResult<Json<Vec<Report>>> {
    Ok(Json(state.moderation.list_reports(&actor, id).await?))
}

/// POST /api/events/{id}/status
async fn set_status(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(id): Path<Uuid>,
    Json(request): Json<EventStatusRequest>,
) -> ServerResult<Json<EventView>> {
    let event = state
        .moderation
        .set_event_status(&actor, id, request.status)
        .await?;
    Ok(Json(EventView::for_actor(event, &actor)))
}
