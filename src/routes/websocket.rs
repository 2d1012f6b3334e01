use axum::{
    Router,
    extract::{Path, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    routes::identity::Identity,
    services::{
        vote_service,
        websocket_service::{self, DraftTarget},
    },
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/ws/parties/{id}/events/{event_id}",
    tag = "drafts",
    params(
        ("id" = Uuid, Path, description = "Party identifier"),
        ("event_id" = String, Path, description = "Event identifier"),
        ("member_id" = String, Query, description = "Caller identity; `X-Member-Id` is accepted too")
    ),
    responses(
        (status = 101, description = "Switching protocols to the draft session WebSocket"),
        (status = 401, description = "Caller is not a member")
    )
)]
/// Upgrade into a draft session: ratings are debounced and committed per entry.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Identity(member): Identity,
    Path((id, event_id)): Path<(Uuid, String)>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let ballot = vote_service::own_ballot(&state, id, &event_id, &member.id).await?;
    let target = DraftTarget {
        party_id: id,
        event_id,
        member_id: member.id,
    };
    Ok(ws.on_upgrade(move |socket| websocket_service::handle_socket(state, socket, target, ballot)))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws/parties/{id}/events/{event_id}", get(ws_handler))
}
