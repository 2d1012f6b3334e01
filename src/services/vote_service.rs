use std::{collections::BTreeMap, sync::Arc};

use futures::future::BoxFuture;
use tracing::info;
use uuid::Uuid;

use crate::{
    dao::vote_store::VoteStore,
    dto::votes::{AggregateView, BallotView, EventVotesView, MemberProgress, VoteProgress},
    error::ServiceError,
    services::{draft_buffer::RatingSink, transaction::run_event_votes_transaction},
    state::{
        SharedState, VoteScope, VotesReceiver,
        aggregate::{EventVotes, Score, is_revealed, voted_member_count},
        catalog::{Entry, Event},
        party::Party,
        schedule::{EventStatus, status_of},
    },
};

/// Everything a vote operation needs once the caller has been checked.
struct VotingContext {
    store: Arc<dyn VoteStore>,
    party: Party,
    event: Event,
    status: EventStatus,
}

impl VotingContext {
    fn scope(&self) -> VoteScope {
        VoteScope::new(self.party.id, self.event.id.clone())
    }
}

/// Load the party and event, making sure the caller belongs to the party.
async fn load_context(
    state: &SharedState,
    party_id: Uuid,
    event_id: &str,
    member_id: &str,
) -> Result<VotingContext, ServiceError> {
    let event = state
        .catalog()
        .event(event_id)
        .cloned()
        .ok_or_else(|| ServiceError::NotFound(format!("event `{event_id}` not found")))?;
    let store = state.require_vote_store().await?;
    let party = load_member_party(store.as_ref(), party_id, member_id).await?;
    let status = status_of(&event, state.local_now());

    Ok(VotingContext {
        store,
        party,
        event,
        status,
    })
}

/// Fetch a party on behalf of one of its members.
pub(crate) async fn load_member_party(
    store: &dyn VoteStore,
    party_id: Uuid,
    member_id: &str,
) -> Result<Party, ServiceError> {
    let party = store
        .find_party(party_id)
        .await?
        .map(|stored| Party::from(stored.value))
        .ok_or_else(|| ServiceError::NotFound(format!("party `{party_id}` not found")))?;
    if !party.is_member(member_id) {
        return Err(ServiceError::Unauthorized(format!(
            "`{member_id}` is not a member of party `{party_id}`"
        )));
    }
    Ok(party)
}

/// Committed votes of a scope, or an empty set when nobody voted yet.
pub(crate) async fn load_votes(
    store: &dyn VoteStore,
    party_id: Uuid,
    event_id: &str,
) -> Result<EventVotes, ServiceError> {
    match store.find_event_votes(party_id, event_id.to_owned()).await? {
        Some(stored) => Ok(stored.value.into_votes()?),
        None => Ok(EventVotes::default()),
    }
}

fn ensure_accepts_votes(event: &Event, status: EventStatus) -> Result<(), ServiceError> {
    match status {
        EventStatus::Upcoming => Err(ServiceError::InvalidState(format!(
            "voting for `{}` has not opened yet",
            event.id
        ))),
        status if !status.accepts_votes() => Err(ServiceError::InvalidState(format!(
            "voting for `{}` is closed",
            event.id
        ))),
        _ => Ok(()),
    }
}

fn ensure_entry(state: &SharedState, event: &Event, entry_id: &str) -> Result<(), ServiceError> {
    if state.catalog().entry(&event.id, entry_id).is_none() {
        return Err(ServiceError::InvalidInput(format!(
            "`{entry_id}` is not an entry of `{}`",
            event.id
        )));
    }
    Ok(())
}

/// Run one vote mutation for the caller and fan the committed snapshot out to viewers.
async fn commit<F>(
    state: &SharedState,
    context: &VotingContext,
    member_id: &str,
    mut mutate: F,
) -> Result<BallotView, ServiceError>
where
    F: FnMut(&mut EventVotes),
{
    let scope = context.scope();
    let attempts = state.config().voting().max_transaction_attempts;
    let (votes, ()) =
        run_event_votes_transaction(context.store.as_ref(), &scope, attempts, |votes| {
            mutate(votes);
            Ok(())
        })
        .await?;

    let ballot = BallotView::new(&scope.event_id, member_id, votes.ballot(member_id));
    state.sse().publish_votes(&scope, votes);
    Ok(ballot)
}

/// Replace the caller's ballot for an event with `ratings` and `favorite`.
pub async fn submit_full_ballot(
    state: &SharedState,
    party_id: Uuid,
    event_id: &str,
    member_id: &str,
    ratings: BTreeMap<String, i64>,
    favorite: Option<String>,
) -> Result<BallotView, ServiceError> {
    let context = load_context(state, party_id, event_id, member_id).await?;
    ensure_accepts_votes(&context.event, context.status)?;

    if ratings.is_empty() && favorite.is_none() {
        return Err(ServiceError::InvalidInput(
            "a ballot needs at least one rating or a favorite".into(),
        ));
    }
    let mut scores = BTreeMap::new();
    for (entry_id, value) in ratings {
        ensure_entry(state, &context.event, &entry_id)?;
        scores.insert(entry_id, Score::new(value)?);
    }
    if let Some(favorite) = &favorite {
        ensure_entry(state, &context.event, favorite)?;
    }

    let now = state.now_system();
    let ballot = commit(state, &context, member_id, |votes| {
        votes.apply_full_ballot(member_id, scores.clone(), favorite.clone(), now)
    })
    .await?;

    info!(%party_id, event_id, member_id, ratings = ballot.ratings.len(), "ballot submitted");
    Ok(ballot)
}

/// Rate one entry, leaving the rest of the caller's ballot untouched.
pub async fn submit_single_rating(
    state: &SharedState,
    party_id: Uuid,
    event_id: &str,
    member_id: &str,
    entry_id: &str,
    score: i64,
) -> Result<BallotView, ServiceError> {
    let context = load_context(state, party_id, event_id, member_id).await?;
    ensure_accepts_votes(&context.event, context.status)?;
    ensure_entry(state, &context.event, entry_id)?;
    let score = Score::new(score)?;

    let now = state.now_system();
    commit(state, &context, member_id, |votes| {
        votes.apply_rating(member_id, entry_id, score, now)
    })
    .await
}

/// Set or clear the caller's favorite. Counts as participation.
pub async fn submit_favorite(
    state: &SharedState,
    party_id: Uuid,
    event_id: &str,
    member_id: &str,
    favorite: Option<String>,
) -> Result<BallotView, ServiceError> {
    let context = load_context(state, party_id, event_id, member_id).await?;
    ensure_accepts_votes(&context.event, context.status)?;
    if let Some(favorite) = &favorite {
        ensure_entry(state, &context.event, favorite)?;
    }

    let now = state.now_system();
    commit(state, &context, member_id, |votes| {
        votes.apply_favorite(member_id, favorite.clone(), now)
    })
    .await
}

/// The caller's own ballot, visible at any time.
pub async fn own_ballot(
    state: &SharedState,
    party_id: Uuid,
    event_id: &str,
    member_id: &str,
) -> Result<BallotView, ServiceError> {
    let context = load_context(state, party_id, event_id, member_id).await?;
    let votes = load_votes(context.store.as_ref(), party_id, event_id).await?;
    Ok(BallotView::new(event_id, member_id, votes.ballot(member_id)))
}

/// The party's votes for an event as the caller may see them.
pub async fn votes_view(
    state: &SharedState,
    party_id: Uuid,
    event_id: &str,
    member_id: &str,
) -> Result<EventVotesView, ServiceError> {
    let context = load_context(state, party_id, event_id, member_id).await?;
    let votes = load_votes(context.store.as_ref(), party_id, event_id).await?;
    Ok(project_votes(
        &context.party,
        &context.event.id,
        state.catalog().entries(event_id),
        context.status,
        &votes,
        member_id,
    ))
}

/// Shape votes for one viewer: progress always, totals only once revealed.
pub fn project_votes(
    party: &Party,
    event_id: &str,
    entries: &[Entry],
    status: EventStatus,
    votes: &EventVotes,
    viewer_id: &str,
) -> EventVotesView {
    let revealed = is_revealed(&votes.voter_ids, &party.members, status);
    let members = party
        .members
        .iter()
        .map(|id| MemberProgress {
            id: id.clone(),
            name: party.member_names.get(id).cloned().unwrap_or_default(),
            voted: votes.has_voted(id),
        })
        .collect();

    EventVotesView {
        party_id: party.id,
        event_id: event_id.to_owned(),
        status,
        revealed,
        progress: VoteProgress {
            voted: voted_member_count(&votes.voter_ids, &party.members),
            total: party.members.len(),
            members,
        },
        aggregates: revealed.then(|| {
            entries
                .iter()
                .map(|entry| AggregateView::new(&entry.id, votes.aggregate(&entry.id)))
                .collect()
        }),
        own_ballot: BallotView::new(event_id, viewer_id, votes.ballot(viewer_id)),
    }
}

/// Check access and start following the committed votes of a scope.
pub async fn subscribe_votes(
    state: &SharedState,
    party_id: Uuid,
    event_id: &str,
    member_id: &str,
) -> Result<(EventVotesView, VotesReceiver), ServiceError> {
    let scope = VoteScope::new(party_id, event_id);
    let receiver = state.sse().subscribe_votes(&scope);
    let initial = votes_view(state, party_id, event_id, member_id).await?;
    Ok((initial, receiver))
}

/// Recompute a viewer's projection for a snapshot pushed to a subscription.
pub async fn view_of_snapshot(
    state: &SharedState,
    party_id: Uuid,
    event_id: &str,
    member_id: &str,
    votes: &EventVotes,
) -> Result<EventVotesView, ServiceError> {
    let context = load_context(state, party_id, event_id, member_id).await?;
    Ok(project_votes(
        &context.party,
        &context.event.id,
        state.catalog().entries(event_id),
        context.status,
        votes,
        member_id,
    ))
}

/// Commits draft ratings of one member through the vote engine.
#[derive(Clone)]
pub struct MemberRatingSink {
    state: SharedState,
    party_id: Uuid,
    event_id: String,
    member_id: String,
}

impl MemberRatingSink {
    pub fn new(state: SharedState, party_id: Uuid, event_id: String, member_id: String) -> Self {
        Self {
            state,
            party_id,
            event_id,
            member_id,
        }
    }
}

impl RatingSink for MemberRatingSink {
    fn commit_rating(&self, entry_id: String, score: Score) -> BoxFuture<'static, Result<(), ServiceError>> {
        let sink = self.clone();
        Box::pin(async move {
            submit_single_rating(
                &sink.state,
                sink.party_id,
                &sink.event_id,
                &sink.member_id,
                &entry_id,
                i64::from(score.get()),
            )
            .await
            .map(|_| ())
        })
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::services::{party_service, test_support::Harness};

    const OPEN: time::OffsetDateTime = datetime!(2026-01-31 20:30 +1);

    #[tokio::test]
    async fn full_ballot_updates_aggregates_and_voters() {
        let harness = Harness::at(OPEN).await;
        let party = harness.party_with(&["alice", "bob"]).await;

        let ballot = submit_full_ballot(
            &harness.state,
            party.id,
            "dt1",
            "alice",
            BTreeMap::from([("dt1-1".into(), 8), ("dt1-2".into(), 5)]),
            Some("dt1-1".into()),
        )
        .await
        .unwrap();
        assert_eq!(ballot.ratings.len(), 2);
        assert_eq!(ballot.favorite.as_deref(), Some("dt1-1"));

        let votes = load_votes(&harness.store, party.id, "dt1").await.unwrap();
        assert_eq!(votes.voter_ids, vec!["alice".to_string()]);
        assert_eq!(votes.aggregate("dt1-1").sum, 8);
        assert_eq!(votes.aggregate("dt1-2").count, 1);
    }

    #[tokio::test]
    async fn resubmitting_the_same_ballot_is_idempotent() {
        let harness = Harness::at(OPEN).await;
        let party = harness.party_with(&["alice"]).await;
        let ratings = BTreeMap::from([("dt1-1".to_string(), 7), ("dt1-3".to_string(), 4)]);

        for _ in 0..3 {
            submit_full_ballot(&harness.state, party.id, "dt1", "alice", ratings.clone(), None)
                .await
                .unwrap();
        }

        let votes = load_votes(&harness.store, party.id, "dt1").await.unwrap();
        assert_eq!(votes.aggregate("dt1-1").count, 1);
        assert_eq!(votes.aggregate("dt1-1").sum, 7);
        assert_eq!(votes.voter_ids.len(), 1);
    }

    #[tokio::test]
    async fn single_rating_replaces_without_recounting() {
        let harness = Harness::at(OPEN).await;
        let party = harness.party_with(&["alice", "bob"]).await;

        submit_single_rating(&harness.state, party.id, "dt1", "alice", "dt1-1", 6)
            .await
            .unwrap();
        submit_single_rating(&harness.state, party.id, "dt1", "bob", "dt1-1", 9)
            .await
            .unwrap();
        submit_single_rating(&harness.state, party.id, "dt1", "alice", "dt1-1", 8)
            .await
            .unwrap();

        let votes = load_votes(&harness.store, party.id, "dt1").await.unwrap();
        let aggregate = votes.aggregate("dt1-1");
        assert_eq!((aggregate.sum, aggregate.count), (17, 2));
        assert_eq!(aggregate.avg, 8.5);
    }

    #[tokio::test]
    async fn favorite_alone_counts_as_participation() {
        let harness = Harness::at(OPEN).await;
        let party = harness.party_with(&["alice"]).await;

        let ballot =
            submit_favorite(&harness.state, party.id, "dt1", "alice", Some("dt1-4".into()))
                .await
                .unwrap();

        assert!(ballot.ratings.is_empty());
        let votes = load_votes(&harness.store, party.id, "dt1").await.unwrap();
        assert!(votes.has_voted("alice"));
        assert!(votes.aggregates.is_empty());
    }

    #[tokio::test]
    async fn off_scale_and_foreign_ratings_are_rejected() {
        let harness = Harness::at(OPEN).await;
        let party = harness.party_with(&["alice"]).await;

        let too_high =
            submit_single_rating(&harness.state, party.id, "dt1", "alice", "dt1-1", 11).await;
        assert!(matches!(too_high, Err(ServiceError::InvalidInput(_))));

        let wrong_event =
            submit_single_rating(&harness.state, party.id, "dt1", "alice", "dt2-1", 5).await;
        assert!(matches!(wrong_event, Err(ServiceError::InvalidInput(_))));

        let empty =
            submit_full_ballot(&harness.state, party.id, "dt1", "alice", BTreeMap::new(), None)
                .await;
        assert!(matches!(empty, Err(ServiceError::InvalidInput(_))));

        assert!(
            harness
                .store
                .find_event_votes(party.id, "dt1".into())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn outsiders_cannot_vote() {
        let harness = Harness::at(OPEN).await;
        let party = harness.party_with(&["alice"]).await;

        let result =
            submit_single_rating(&harness.state, party.id, "dt1", "mallory", "dt1-1", 5).await;

        assert!(matches!(result, Err(ServiceError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn votes_are_refused_outside_the_voting_window() {
        let harness = Harness::at(OPEN).await;
        let party = harness.party_with(&["alice"]).await;

        let early =
            submit_single_rating(&harness.state, party.id, "dt2", "alice", "dt2-1", 5).await;
        assert!(matches!(early, Err(ServiceError::InvalidState(_))));

        harness.clock.set(datetime!(2026-02-01 00:10 +1));
        let late =
            submit_single_rating(&harness.state, party.id, "dt1", "alice", "dt1-1", 5).await;
        assert!(matches!(late, Err(ServiceError::InvalidState(_))));
    }

    #[tokio::test]
    async fn totals_stay_hidden_until_everyone_voted() {
        let harness = Harness::at(OPEN).await;
        let party = harness.party_with(&["alice", "bob"]).await;

        submit_single_rating(&harness.state, party.id, "dt1", "alice", "dt1-1", 7)
            .await
            .unwrap();
        let view = votes_view(&harness.state, party.id, "dt1", "bob").await.unwrap();
        assert!(!view.revealed);
        assert!(view.aggregates.is_none());
        assert_eq!((view.progress.voted, view.progress.total), (1, 2));
        assert!(view.own_ballot.ratings.is_empty());

        submit_single_rating(&harness.state, party.id, "dt1", "bob", "dt1-1", 9)
            .await
            .unwrap();
        let view = votes_view(&harness.state, party.id, "dt1", "bob").await.unwrap();
        assert!(view.revealed);
        let totals = view.aggregates.unwrap();
        assert_eq!(totals.len(), harness.state.catalog().entries("dt1").len());
        assert_eq!(totals[0].entry_id, "dt1-1");
        assert_eq!(totals[0].avg, 8.0);
    }

    #[tokio::test]
    async fn closing_the_window_reveals_partial_votes() {
        let harness = Harness::at(OPEN).await;
        let party = harness.party_with(&["alice", "bob"]).await;
        submit_single_rating(&harness.state, party.id, "dt1", "alice", "dt1-2", 3)
            .await
            .unwrap();

        harness.clock.set(datetime!(2026-01-31 23:59 +1));

        let view = votes_view(&harness.state, party.id, "dt1", "bob").await.unwrap();
        assert_eq!(view.status, EventStatus::VotingClosed);
        assert!(view.revealed);
    }

    #[tokio::test]
    async fn removed_members_no_longer_block_the_reveal() {
        let harness = Harness::at(OPEN).await;
        let party = harness.party_with(&["alice", "bob"]).await;
        submit_single_rating(&harness.state, party.id, "dt1", "alice", "dt1-2", 3)
            .await
            .unwrap();

        party_service::remove_member(&harness.state, party.id, "alice", "bob")
            .await
            .unwrap();

        let view = votes_view(&harness.state, party.id, "dt1", "alice").await.unwrap();
        assert!(view.revealed);
    }

    #[tokio::test]
    async fn subscribers_receive_committed_snapshots() {
        let harness = Harness::at(OPEN).await;
        let party = harness.party_with(&["alice"]).await;
        let (initial, mut receiver) = subscribe_votes(&harness.state, party.id, "dt1", "alice")
            .await
            .unwrap();
        assert_eq!(initial.progress.voted, 0);

        submit_single_rating(&harness.state, party.id, "dt1", "alice", "dt1-5", 10)
            .await
            .unwrap();

        receiver.changed().await.unwrap();
        let snapshot = receiver.borrow_and_update().clone().unwrap();
        assert_eq!(snapshot.aggregate("dt1-5").sum, 10);
    }
}
