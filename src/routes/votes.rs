use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, put},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::votes::{
        BallotView, EventVotesView, SubmitBallotRequest, SubmitFavoriteRequest, SubmitRatingRequest,
    },
    error::AppError,
    routes::identity::Identity,
    services::vote_service,
    state::SharedState,
};

/// Ballot submission and vote progress endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/parties/{id}/events/{event_id}/ballot",
            get(own_ballot).put(submit_ballot),
        )
        .route(
            "/parties/{id}/events/{event_id}/ratings/{entry_id}",
            put(submit_rating),
        )
        .route(
            "/parties/{id}/events/{event_id}/favorite",
            put(submit_favorite),
        )
        .route("/parties/{id}/events/{event_id}/votes", get(votes_view))
}

#[utoipa::path(
    put,
    path = "/parties/{id}/events/{event_id}/ballot",
    tag = "votes",
    params(
        ("id" = Uuid, Path, description = "Party identifier"),
        ("event_id" = String, Path, description = "Event identifier"),
        ("X-Member-Id" = String, Header, description = "Caller identity")
    ),
    request_body = SubmitBallotRequest,
    responses(
        (status = 200, description = "Stored ballot", body = BallotView),
        (status = 400, description = "Unknown entry, score off the 1-10 scale or empty ballot"),
        (status = 401, description = "Caller is not a member"),
        (status = 409, description = "Voting is closed or the write kept conflicting"),
        (status = 503, description = "Storage unavailable")
    )
)]
/// Replace the caller's whole ballot for an event.
pub async fn submit_ballot(
    State(state): State<SharedState>,
    Identity(member): Identity,
    Path((id, event_id)): Path<(Uuid, String)>,
    Valid(Json(payload)): Valid<Json<SubmitBallotRequest>>,
) -> Result<Json<BallotView>, AppError> {
    let ballot = vote_service::submit_full_ballot(
        &state,
        id,
        &event_id,
        &member.id,
        payload.ratings,
        payload.favorite,
    )
    .await?;
    Ok(Json(ballot))
}

#[utoipa::path(
    put,
    path = "/parties/{id}/events/{event_id}/ratings/{entry_id}",
    tag = "votes",
    params(
        ("id" = Uuid, Path, description = "Party identifier"),
        ("event_id" = String, Path, description = "Event identifier"),
        ("entry_id" = String, Path, description = "Entry identifier"),
        ("X-Member-Id" = String, Header, description = "Caller identity")
    ),
    request_body = SubmitRatingRequest,
    responses(
        (status = 200, description = "Ballot after the change", body = BallotView),
        (status = 400, description = "Unknown entry or score off the scale"),
        (status = 409, description = "Voting is closed or the write kept conflicting")
    )
)]
/// Rate a single entry.
pub async fn submit_rating(
    State(state): State<SharedState>,
    Identity(member): Identity,
    Path((id, event_id, entry_id)): Path<(Uuid, String, String)>,
    Valid(Json(payload)): Valid<Json<SubmitRatingRequest>>,
) -> Result<Json<BallotView>, AppError> {
    let ballot = vote_service::submit_single_rating(
        &state,
        id,
        &event_id,
        &member.id,
        &entry_id,
        payload.score,
    )
    .await?;
    Ok(Json(ballot))
}

#[utoipa::path(
    put,
    path = "/parties/{id}/events/{event_id}/favorite",
    tag = "votes",
    params(
        ("id" = Uuid, Path, description = "Party identifier"),
        ("event_id" = String, Path, description = "Event identifier"),
        ("X-Member-Id" = String, Header, description = "Caller identity")
    ),
    request_body = SubmitFavoriteRequest,
    responses(
        (status = 200, description = "Ballot after the change", body = BallotView),
        (status = 400, description = "Unknown entry"),
        (status = 409, description = "Voting is closed")
    )
)]
/// Set or clear the caller's favorite entry.
pub async fn submit_favorite(
    State(state): State<SharedState>,
    Identity(member): Identity,
    Path((id, event_id)): Path<(Uuid, String)>,
    Json(payload): Json<SubmitFavoriteRequest>,
) -> Result<Json<BallotView>, AppError> {
    let ballot =
        vote_service::submit_favorite(&state, id, &event_id, &member.id, payload.favorite).await?;
    Ok(Json(ballot))
}

#[utoipa::path(
    get,
    path = "/parties/{id}/events/{event_id}/ballot",
    tag = "votes",
    params(
        ("id" = Uuid, Path, description = "Party identifier"),
        ("event_id" = String, Path, description = "Event identifier"),
        ("X-Member-Id" = String, Header, description = "Caller identity")
    ),
    responses((status = 200, description = "Caller's ballot, empty before voting", body = BallotView))
)]
/// Return the caller's own ballot.
pub async fn own_ballot(
    State(state): State<SharedState>,
    Identity(member): Identity,
    Path((id, event_id)): Path<(Uuid, String)>,
) -> Result<Json<BallotView>, AppError> {
    Ok(Json(
        vote_service::own_ballot(&state, id, &event_id, &member.id).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/parties/{id}/events/{event_id}/votes",
    tag = "votes",
    params(
        ("id" = Uuid, Path, description = "Party identifier"),
        ("event_id" = String, Path, description = "Event identifier"),
        ("X-Member-Id" = String, Header, description = "Caller identity")
    ),
    responses((status = 200, description = "Progress, plus totals once revealed", body = EventVotesView))
)]
/// Return the party's voting progress and, once revealed, the per-entry totals.
pub async fn votes_view(
    State(state): State<SharedState>,
    Identity(member): Identity,
    Path((id, event_id)): Path<(Uuid, String)>,
) -> Result<Json<EventVotesView>, AppError> {
    Ok(Json(
        vote_service::votes_view(&state, id, &event_id, &member.id).await?,
    ))
}
