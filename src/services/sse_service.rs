use std::{convert::Infallible, time::Duration};

use async_stream::stream;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc, watch,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::sse::ServerEvent,
    error::ServiceError,
    services::{
        sse_events::{handshake_event, system_status_event, votes_updated_event},
        vote_service,
    },
    state::SharedState,
};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Subscribe to the status stream: current event changes and degraded mode toggles.
pub async fn status_stream(state: SharedState) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.status_sse().subscribe();
    let degraded = state.degraded_watcher();
    let handshake = handshake_event("status", state.is_degraded().await);
    to_sse_stream(receiver, degraded, handshake)
}

/// Convert the status broadcast into an SSE response, forwarding events and degraded
/// mode changes until the client disconnects.
fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
    mut degraded: watch::Receiver<bool>,
    handshake: Option<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        degraded.mark_unchanged();
        if let Some(handshake) = handshake {
            if tx.send(Ok(to_event(handshake))).await.is_err() {
                return;
            }
        }

        loop {
            let payload = tokio::select! {
                _ = tx.closed() => break,
                changed = degraded.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let value = *degraded.borrow_and_update();
                    match system_status_event(value) {
                        Some(event) => event,
                        None => continue,
                    }
                }
                recv_result = receiver.recv() => match recv_result {
                    Ok(payload) => payload,
                    Err(RecvError::Closed) => break,
                    // Skip lagged messages but keep the stream alive.
                    Err(RecvError::Lagged(_)) => continue,
                },
            };

            if tx.send(Ok(to_event(payload))).await.is_err() {
                break;
            }
        }

        info!("status SSE stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    with_keep_alive(ReceiverStream::new(rx))
}

/// Subscribe a member to vote progress and, once revealed, aggregate updates of a scope.
///
/// Fails up front when the member may not see the party's votes.
pub async fn votes_stream(
    state: SharedState,
    party_id: Uuid,
    event_id: String,
    member_id: String,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServiceError> {
    let (initial, mut receiver) =
        vote_service::subscribe_votes(&state, party_id, &event_id, &member_id).await?;
    let handshake = handshake_event("votes", state.is_degraded().await);

    let events = stream! {
        if let Some(handshake) = handshake {
            yield Ok(to_event(handshake));
        }
        if let Some(event) = votes_updated_event(&initial) {
            yield Ok(to_event(event));
        }

        while receiver.changed().await.is_ok() {
            let Some(snapshot) = receiver.borrow_and_update().clone() else {
                continue;
            };
            match vote_service::view_of_snapshot(&state, party_id, &event_id, &member_id, &snapshot).await {
                Ok(view) => {
                    if let Some(event) = votes_updated_event(&view) {
                        yield Ok(to_event(event));
                    }
                }
                Err(ServiceError::Unauthorized(_)) => {
                    info!(%party_id, member_id = %member_id, "member left the party; closing votes stream");
                    break;
                }
                Err(err) => warn!(%party_id, error = %err, "failed to project vote update"),
            }
        }
    };

    Ok(with_keep_alive(events))
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

fn with_keep_alive<S>(stream: S) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use axum::response::IntoResponse;
    use futures::StreamExt;
    use time::macros::datetime;

    use super::*;
    use crate::services::test_support::Harness;

    #[tokio::test]
    async fn status_stream_outlives_the_request_state() {
        let harness = Harness::at(datetime!(2026-01-31 19:00 +1)).await;
        let sse = status_stream(harness.state.clone()).await;
        drop(harness);

        let mut body = sse.into_response().into_body().into_data_stream();
        let first = body.next().await.expect("handshake frame").expect("frame bytes");
        let text = String::from_utf8_lossy(&first);
        assert!(text.contains("event: handshake"), "unexpected frame: {text}");
    }

    #[tokio::test]
    async fn votes_stream_rejects_outsiders_up_front() {
        let harness = Harness::at(datetime!(2026-01-31 20:30 +1)).await;
        let party = harness.party_with(&["anna", "bosse"]).await;

        let result = votes_stream(
            harness.state.clone(),
            party.id,
            "dt1".to_string(),
            "mallory".to_string(),
        )
        .await;

        assert!(matches!(result, Err(ServiceError::Unauthorized(_))));
    }
}
