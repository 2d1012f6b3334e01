use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::AppError, routes::identity::Identity, services::sse_service, state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sse/status",
    tag = "sse",
    responses((status = 200, description = "Current event status stream", content_type = "text/event-stream", body = String))
)]
/// Stream current event changes and degraded mode toggles.
pub async fn status_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("new status SSE connection");
    sse_service::status_stream(state).await
}

#[utoipa::path(
    get,
    path = "/sse/parties/{id}/events/{event_id}",
    tag = "sse",
    params(
        ("id" = Uuid, Path, description = "Party identifier"),
        ("event_id" = String, Path, description = "Event identifier"),
        ("member_id" = String, Query, description = "Caller identity; `X-Member-Id` is accepted too")
    ),
    responses(
        (status = 200, description = "Vote progress and revealed totals", content_type = "text/event-stream", body = String),
        (status = 401, description = "Caller is not a member")
    )
)]
/// Stream a party's votes for one event as the caller may see them.
pub async fn votes_stream(
    State(state): State<SharedState>,
    Identity(member): Identity,
    Path((id, event_id)): Path<(Uuid, String)>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    info!(party_id = %id, event_id = %event_id, member_id = %member.id, "new votes SSE connection");
    Ok(sse_service::votes_stream(state, id, event_id, member.id).await?)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sse/status", get(status_stream))
        .route("/sse/parties/{id}/events/{event_id}", get(votes_stream))
}
