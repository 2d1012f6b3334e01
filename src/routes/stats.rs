use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::stats::{EventResultsResponse, LeaderboardResponse, PartyStatsResponse},
    error::AppError,
    routes::identity::Identity,
    services::stats_service,
    state::SharedState,
};

/// Party results and statistics endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/parties/{id}/events/{event_id}/results", get(event_results))
        .route("/parties/{id}/leaderboard", get(leaderboard))
        .route("/parties/{id}/stats", get(party_stats))
}

#[utoipa::path(
    get,
    path = "/parties/{id}/events/{event_id}/results",
    tag = "stats",
    params(
        ("id" = Uuid, Path, description = "Party identifier"),
        ("event_id" = String, Path, description = "Event identifier"),
        ("X-Member-Id" = String, Header, description = "Caller identity")
    ),
    responses(
        (status = 200, description = "Ranked entries and favorite counts", body = EventResultsResponse),
        (status = 409, description = "Results are not revealed yet")
    )
)]
/// Rank the entries of an event by the party's average score.
pub async fn event_results(
    State(state): State<SharedState>,
    Identity(member): Identity,
    Path((id, event_id)): Path<(Uuid, String)>,
) -> Result<Json<EventResultsResponse>, AppError> {
    Ok(Json(
        stats_service::event_results(&state, id, &event_id, &member.id).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/parties/{id}/leaderboard",
    tag = "stats",
    params(
        ("id" = Uuid, Path, description = "Party identifier"),
        ("X-Member-Id" = String, Header, description = "Caller identity")
    ),
    responses((status = 200, description = "Season ranking over completed events", body = LeaderboardResponse))
)]
/// Rank every entry of the completed events together.
pub async fn leaderboard(
    State(state): State<SharedState>,
    Identity(member): Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    Ok(Json(
        stats_service::party_leaderboard(&state, id, &member.id).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/parties/{id}/stats",
    tag = "stats",
    params(
        ("id" = Uuid, Path, description = "Party identifier"),
        ("X-Member-Id" = String, Header, description = "Caller identity")
    ),
    responses((status = 200, description = "Agreement per entry and overall", body = PartyStatsResponse))
)]
/// How much the party agreed on each entry.
pub async fn party_stats(
    State(state): State<SharedState>,
    Identity(member): Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<PartyStatsResponse>, AppError> {
    Ok(Json(stats_service::party_stats(&state, id, &member.id).await?))
}
