//! Comment routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use civicfeed_core::Comment;
use civicfeed_protocol::{CommentStatusRequest, CreateCommentRequest};
use uuid::Uuid;

use super::AppState;
use super::actor::RequestActor;
use crate::error::ServerResult;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/events/{id}/comments", get(list_comments).post(post_comment))
        .route("/api/comments/{id}/status", post(set_status))
        .route("/api/comments/{id}", delete(delete_comment))
}

async fn list_comments(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(event_id): Path<Uuid>,
) -> ServerResult<Json<Vec<Comment>>> {
    Ok(Json(state.moderation.list_comments(&actor, event_id).await?))
}

async fn post_comment(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(event_id): Path<Uuid>,
    Json(request): Json<CreateCommentRequest>,
) -> ServerResult<(StatusCode, Json<Comment>)> {
    let comment = state
        .moderation
        .post_comment(&actor, event_id, &request.author_name, &request.body)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn set_status(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(comment_id): Path<Uuid>,
    Json(request): Json<CommentStatusRequest>,
) -> ServerResult<Json<Comment>> {
    Ok(Json(
        state
            .moderation
            .set_comment_status(&actor, comment_id, request.status)
            .await?,
    ))
}

async fn delete_comment(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Path(comment_id): Path<Uuid>,
) -> ServerResult<StatusCode> {
    state.moderation.delete_comment(&actor, comment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
