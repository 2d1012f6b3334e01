use serde::Serialize;
use tracing::warn;

use crate::{
    dto::{
        events::EventSummary,
        sse::{Handshake, ServerEvent, StatusChangedEvent, SystemStatus},
        votes::EventVotesView,
    },
    state::{SharedState, schedule::CurrentEvent},
};

pub const EVENT_HANDSHAKE: &str = "handshake";
pub const EVENT_STATUS_CHANGED: &str = "status.changed";
pub const EVENT_VOTES_UPDATED: &str = "votes.updated";
pub const EVENT_SYSTEM_STATUS: &str = "system_status";

/// Broadcast the newly resolved current event to status subscribers.
pub fn broadcast_status_changed(state: &SharedState, current: &CurrentEvent) {
    let payload = StatusChangedEvent {
        event: EventSummary::new(&current.event, current.status),
        status: current.status,
    };
    send_status_event(state, EVENT_STATUS_CHANGED, &payload);
}

/// First message of every stream.
pub fn handshake_event(stream: &str, degraded: bool) -> Option<ServerEvent> {
    let payload = Handshake {
        stream: stream.to_string(),
        message: format!("subscribed to {stream} updates"),
        degraded,
    };
    build_event(EVENT_HANDSHAKE, &payload)
}

/// Degraded mode toggle, sent on the status stream.
pub fn system_status_event(degraded: bool) -> Option<ServerEvent> {
    build_event(EVENT_SYSTEM_STATUS, &SystemStatus { degraded })
}

/// Projection of a scope's votes for one viewer.
pub fn votes_updated_event(view: &EventVotesView) -> Option<ServerEvent> {
    build_event(EVENT_VOTES_UPDATED, view)
}

fn send_status_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    if let Some(event) = build_event(event, payload) {
        state.status_sse().broadcast(event);
    }
}

fn build_event(event: &str, payload: &impl Serialize) -> Option<ServerEvent> {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(event, error = %err, "failed to serialize SSE payload");
            None
        }
    }
}
