use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::parties::{CreatePartyRequest, JoinPartyRequest, PartySummary},
    error::AppError,
    routes::identity::Identity,
    services::party_service,
    state::SharedState,
};

/// Party membership endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/parties", get(list_parties).post(create_party))
        .route("/parties/join", post(join_party))
        .route("/parties/{id}", get(get_party))
        .route("/parties/{id}/members/{member_id}", delete(remove_member))
}

#[utoipa::path(
    post,
    path = "/parties",
    tag = "parties",
    params(("X-Member-Id" = String, Header, description = "Caller identity")),
    request_body = CreatePartyRequest,
    responses(
        (status = 201, description = "Party created", body = PartySummary),
        (status = 400, description = "Invalid name"),
        (status = 503, description = "Storage unavailable")
    )
)]
/// Start a new party with the caller as creator and only member.
pub async fn create_party(
    State(state): State<SharedState>,
    Identity(member): Identity,
    Valid(Json(payload)): Valid<Json<CreatePartyRequest>>,
) -> Result<(StatusCode, Json<PartySummary>), AppError> {
    let party = party_service::create_party(&state, &member, &payload.name).await?;
    Ok((StatusCode::CREATED, Json(party.into())))
}

#[utoipa::path(
    get,
    path = "/parties",
    tag = "parties",
    params(("X-Member-Id" = String, Header, description = "Caller identity")),
    responses((status = 200, description = "Parties the caller belongs to", body = [PartySummary]))
)]
/// List the caller's parties, oldest first.
pub async fn list_parties(
    State(state): State<SharedState>,
    Identity(member): Identity,
) -> Result<Json<Vec<PartySummary>>, AppError> {
    let parties = party_service::list_parties(&state, &member.id).await?;
    Ok(Json(parties.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/parties/{id}",
    tag = "parties",
    params(
        ("id" = Uuid, Path, description = "Party identifier"),
        ("X-Member-Id" = String, Header, description = "Caller identity")
    ),
    responses(
        (status = 200, description = "Party details", body = PartySummary),
        (status = 401, description = "Caller is not a member"),
        (status = 404, description = "Unknown party")
    )
)]
/// Fetch a party the caller belongs to.
pub async fn get_party(
    State(state): State<SharedState>,
    Identity(member): Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<PartySummary>, AppError> {
    let party = party_service::get_party(&state, id, &member.id).await?;
    Ok(Json(party.into()))
}

#[utoipa::path(
    post,
    path = "/parties/join",
    tag = "parties",
    params(("X-Member-Id" = String, Header, description = "Caller identity")),
    request_body = JoinPartyRequest,
    responses(
        (status = 200, description = "Joined (or already a member)", body = PartySummary),
        (status = 400, description = "Malformed join code"),
        (status = 404, description = "No party uses this code")
    )
)]
/// Join a party by its six-character code.
pub async fn join_party(
    State(state): State<SharedState>,
    Identity(member): Identity,
    Valid(Json(payload)): Valid<Json<JoinPartyRequest>>,
) -> Result<Json<PartySummary>, AppError> {
    let party = party_service::join_party(&state, &member, &payload.join_code).await?;
    Ok(Json(party.into()))
}

#[utoipa::path(
    delete,
    path = "/parties/{id}/members/{member_id}",
    tag = "parties",
    params(
        ("id" = Uuid, Path, description = "Party identifier"),
        ("member_id" = String, Path, description = "Member to remove"),
        ("X-Member-Id" = String, Header, description = "Caller identity; must be the creator")
    ),
    responses(
        (status = 200, description = "Member removed", body = PartySummary),
        (status = 401, description = "Caller is not the creator"),
        (status = 404, description = "Unknown party or member"),
        (status = 409, description = "The creator cannot be removed")
    )
)]
/// Remove a member from a party. Their past ballots are kept.
pub async fn remove_member(
    State(state): State<SharedState>,
    Identity(member): Identity,
    Path((id, member_id)): Path<(Uuid, String)>,
) -> Result<Json<PartySummary>, AppError> {
    let party = party_service::remove_member(&state, id, &member.id, &member_id).await?;
    Ok(Json(party.into()))
}
