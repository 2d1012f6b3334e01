use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dto::events::{CurrentEventResponse, EntrySummary, EventSummary},
    error::AppError,
    services::event_service,
    state::SharedState,
};

/// Read-only catalog endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/events", get(list_events))
        .route("/events/current", get(current_event))
        .route("/events/{event_id}/entries", get(list_entries))
}

#[utoipa::path(
    get,
    path = "/events",
    tag = "events",
    responses((status = 200, description = "Season events with their current status", body = [EventSummary]))
)]
/// List every event of the season in chronological order.
pub async fn list_events(State(state): State<SharedState>) -> Json<Vec<EventSummary>> {
    Json(event_service::list_events(&state))
}

#[utoipa::path(
    get,
    path = "/events/current",
    tag = "events",
    responses(
        (status = 200, description = "Event the app should focus on", body = CurrentEventResponse),
        (status = 500, description = "Catalog has no events")
    )
)]
/// Resolve the current event and its status.
pub async fn current_event(
    State(state): State<SharedState>,
) -> Result<Json<CurrentEventResponse>, AppError> {
    Ok(Json(event_service::current_event_summary(&state)?))
}

#[utoipa::path(
    get,
    path = "/events/{event_id}/entries",
    tag = "events",
    params(("event_id" = String, Path, description = "Event identifier, e.g. `dt1`")),
    responses(
        (status = 200, description = "Line-up in running order", body = [EntrySummary]),
        (status = 404, description = "Unknown event")
    )
)]
/// List the entries competing in an event.
pub async fn list_entries(
    State(state): State<SharedState>,
    Path(event_id): Path<String>,
) -> Result<Json<Vec<EntrySummary>>, AppError> {
    Ok(Json(event_service::list_entries(&state, &event_id)?))
}
