use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use crate::{
    dto::sse::ServerEvent,
    state::{aggregate::EventVotes, catalog::EventId},
};

/// Latest committed votes of a scope, `None` until the first commit seen by this process.
pub type VotesReceiver = watch::Receiver<Option<Arc<EventVotes>>>;

/// The (party, event) pair that owns one ballots-and-aggregates document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VoteScope {
    pub party_id: Uuid,
    pub event_id: EventId,
}

impl VoteScope {
    pub fn new(party_id: Uuid, event_id: impl Into<EventId>) -> Self {
        Self {
            party_id,
            event_id: event_id.into(),
        }
    }
}

/// SSE-specific sub-state carved out from [`AppState`](crate::state::AppState).
pub struct SseState {
    status: SseHub,
    votes: DashMap<VoteScope, watch::Sender<Option<Arc<EventVotes>>>>,
}

impl SseState {
    /// Build the SSE sub-tree; `status_capacity` bounds the status broadcast channel.
    pub fn new(status_capacity: usize) -> Self {
        Self {
            status: SseHub::new(status_capacity),
            votes: DashMap::new(),
        }
    }

    /// Hub carrying current-event status changes.
    pub fn status(&self) -> &SseHub {
        &self.status
    }

    /// Follow the committed votes of a scope.
    pub fn subscribe_votes(&self, scope: &VoteScope) -> VotesReceiver {
        self.votes
            .entry(scope.clone())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }

    /// Hand a freshly committed snapshot to the scope's subscribers, if any.
    pub fn publish_votes(&self, scope: &VoteScope, votes: EventVotes) {
        if let Some(sender) = self.votes.get(scope) {
            sender.send_replace(Some(Arc::new(votes)));
        }
        self.votes
            .remove_if(scope, |_, sender| sender.receiver_count() == 0);
    }
}

/// Simple broadcast hub wrapper used by the SSE services.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_see_published_votes() {
        let sse = SseState::new(4);
        let scope = VoteScope::new(Uuid::new_v4(), "dt1");
        let mut receiver = sse.subscribe_votes(&scope);

        sse.publish_votes(&scope, EventVotes::default());

        assert!(receiver.has_changed().unwrap());
        assert!(receiver.borrow_and_update().is_some());
    }

    #[test]
    fn scopes_without_subscribers_are_dropped() {
        let sse = SseState::new(4);
        let scope = VoteScope::new(Uuid::new_v4(), "dt1");
        drop(sse.subscribe_votes(&scope));

        sse.publish_votes(&scope, EventVotes::default());

        assert!(sse.votes.is_empty());
    }
}
