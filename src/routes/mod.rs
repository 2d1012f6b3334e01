use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod events;
pub mod health;
pub mod identity;
pub mod parties;
pub mod sse;
pub mod stats;
pub mod votes;
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(events::router())
        .merge(parties::router())
        .merge(votes::router())
        .merge(stats::router())
        .merge(sse::router())
        .merge(websocket::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
