use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        votes::BallotView,
        ws::{DraftInboundMessage, DraftOutboundMessage, SavingStatusDto},
    },
    services::{
        draft_buffer::{DraftSession, SavingStatus, StatusUpdate},
        vote_service::{self, MemberRatingSink},
    },
    state::{SharedState, aggregate::Score},
};

/// Writer channel closed; the connection should be torn down.
#[derive(Debug, Error)]
#[error("connection closed")]
struct ConnectionClosed;

/// Who is drafting, and for which party and event.
#[derive(Debug, Clone)]
pub struct DraftTarget {
    pub party_id: Uuid,
    pub event_id: String,
    pub member_id: String,
}

/// One connected draft session: inbound messages edit the drafts, saving indicators go out.
struct DraftConnection {
    state: SharedState,
    target: DraftTarget,
    session: DraftSession<MemberRatingSink>,
    outbound: UnboundedSender<Message>,
}

impl DraftConnection {
    fn open(
        state: SharedState,
        target: DraftTarget,
        ballot: &BallotView,
        outbound: UnboundedSender<Message>,
    ) -> (Self, UnboundedReceiver<StatusUpdate>) {
        let sink = MemberRatingSink::new(
            state.clone(),
            target.party_id,
            target.event_id.clone(),
            target.member_id.clone(),
        );
        let voting = state.config().voting().clone();
        let (session, updates) = DraftSession::new(sink, voting.debounce, voting.saved_display);
        session.load_ballot(ballot.ratings.iter().filter_map(|(entry_id, value)| {
            Score::new(i64::from(*value))
                .ok()
                .map(|score| (entry_id.clone(), score))
        }));

        (
            Self {
                state,
                target,
                session,
                outbound,
            },
            updates,
        )
    }

    async fn handle_text(&self, text: &str) -> Result<(), ConnectionClosed> {
        let message = match DraftInboundMessage::from_json_str(text) {
            Ok(message) => message,
            Err(err) => {
                warn!(member_id = %self.target.member_id, error = %err, "failed to parse draft message");
                return self.send_error(format!("invalid message: {err}"));
            }
        };

        match message {
            DraftInboundMessage::SetRating { entry_id, score } => {
                if self
                    .state
                    .catalog()
                    .entry(&self.target.event_id, &entry_id)
                    .is_none()
                {
                    return self.send_error(format!(
                        "entry `{entry_id}` is not part of event `{}`",
                        self.target.event_id
                    ));
                }
                match Score::new(score) {
                    Ok(score) => {
                        self.session.set_rating(&entry_id, score);
                        Ok(())
                    }
                    Err(err) => self.send_error(err.to_string()),
                }
            }
            DraftInboundMessage::SetFavorite { favorite } => {
                match vote_service::submit_favorite(
                    &self.state,
                    self.target.party_id,
                    &self.target.event_id,
                    &self.target.member_id,
                    favorite,
                )
                .await
                {
                    Ok(ballot) => send_json(&self.outbound, &DraftOutboundMessage::Ballot { ballot }),
                    Err(err) => self.send_error(err.to_string()),
                }
            }
            DraftInboundMessage::Flush => {
                self.session.flush_all().await;
                Ok(())
            }
            DraftInboundMessage::Retry => {
                self.session.retry_failed().await;
                Ok(())
            }
            DraftInboundMessage::Unknown => self.send_error("unsupported message type".into()),
        }
    }

    fn send_error(&self, message: String) -> Result<(), ConnectionClosed> {
        send_json(&self.outbound, &DraftOutboundMessage::Error { message })
    }

    async fn close(self) {
        self.session.close().await;
    }
}

/// Handle the full lifecycle of a draft session WebSocket.
///
/// The caller has already checked that the member belongs to the party and loaded their
/// stored ballot, which seeds the drafts and is sent as the first message.
pub async fn handle_socket(state: SharedState, socket: WebSocket, target: DraftTarget, ballot: BallotView) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while a flush is awaited.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let (connection, updates) = DraftConnection::open(state, target, &ballot, outbound_tx.clone());
    let status_task = forward_status_updates(updates, outbound_tx.clone());
    let member_id = connection.target.member_id.clone();
    info!(member_id = %member_id, event_id = %connection.target.event_id, "draft session connected");

    if send_json(&outbound_tx, &DraftOutboundMessage::Ballot { ballot }).is_err() {
        connection.close().await;
        status_task.abort();
        finalize(writer_task, outbound_tx).await;
        return;
    }

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if connection.handle_text(text.as_str()).await.is_err() {
                    info!(member_id = %member_id, "connection closed while handling message, terminating");
                    break;
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(member_id = %member_id, error = %err, "websocket error");
                break;
            }
        }
    }

    // Pending drafts are committed even though nobody is listening anymore.
    connection.close().await;
    status_task.abort();
    info!(member_id = %member_id, "draft session disconnected");

    finalize(writer_task, outbound_tx).await;
}

fn forward_status_updates(
    mut updates: UnboundedReceiver<StatusUpdate>,
    outbound: UnboundedSender<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            if send_json(&outbound, &status_message(update)).is_err() {
                break;
            }
        }
    })
}

fn status_message(update: StatusUpdate) -> DraftOutboundMessage {
    DraftOutboundMessage::SavingStatus {
        entry_id: update.entry_id,
        status: match update.status {
            SavingStatus::Idle => SavingStatusDto::Idle,
            SavingStatus::Saving => SavingStatusDto::Saving,
            SavingStatus::Saved => SavingStatusDto::Saved,
            SavingStatus::Error => SavingStatusDto::Error,
        },
        draft: update.draft.map(Score::get),
        message: update.message,
    }
}

fn send_json(
    outbound: &UnboundedSender<Message>,
    message: &DraftOutboundMessage,
) -> Result<(), ConnectionClosed> {
    match serde_json::to_string(message) {
        Ok(text) => outbound
            .send(Message::Text(text.into()))
            .map_err(|_| ConnectionClosed),
        Err(err) => {
            warn!(error = %err, "failed to serialize draft session message");
            Ok(())
        }
    }
}

async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
