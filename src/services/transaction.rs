//! Bounded optimistic read-modify-write loops over the store's compare-and-swap commits.

use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::debug;
use uuid::Uuid;

use crate::{
    dao::{
        models::{CommitOutcome, EventVotesEntity, PartyEntity},
        vote_store::VoteStore,
    },
    error::ServiceError,
    state::{VoteScope, aggregate::EventVotes, party::Party},
};

const BACKOFF_STEP_MS: u64 = 10;
const BACKOFF_JITTER_MS: u64 = 10;

async fn backoff(attempt: u32) {
    let jitter = rand::rng().random_range(0..BACKOFF_JITTER_MS);
    sleep(Duration::from_millis(BACKOFF_STEP_MS * u64::from(attempt) + jitter)).await;
}

/// Load the votes of `scope`, let `mutate` change them and commit the result, retrying on
/// conflicts up to `max_attempts` times.
///
/// `mutate` may run once per attempt, each time on a fresh snapshot. An error from it aborts
/// the transaction without writing anything.
pub async fn run_event_votes_transaction<T, F>(
    store: &dyn VoteStore,
    scope: &VoteScope,
    max_attempts: u32,
    mut mutate: F,
) -> Result<(EventVotes, T), ServiceError>
where
    F: FnMut(&mut EventVotes) -> Result<T, ServiceError>,
{
    let max_attempts = max_attempts.max(1);
    for attempt in 1..=max_attempts {
        let current = store
            .find_event_votes(scope.party_id, scope.event_id.clone())
            .await?;
        let (mut votes, expected) = match current {
            Some(stored) => (stored.value.into_votes()?, Some(stored.revision)),
            None => (EventVotes::default(), None),
        };

        let output = mutate(&mut votes)?;
        let entity = EventVotesEntity::from_votes(scope.party_id, &scope.event_id, &votes);

        match store.commit_event_votes(entity, expected).await? {
            CommitOutcome::Committed(revision) => {
                debug!(
                    party_id = %scope.party_id,
                    event_id = %scope.event_id,
                    %revision,
                    attempt,
                    "event votes committed"
                );
                return Ok((votes, output));
            }
            CommitOutcome::Conflict => {
                debug!(
                    party_id = %scope.party_id,
                    event_id = %scope.event_id,
                    attempt,
                    "event votes changed concurrently; retrying"
                );
                if attempt < max_attempts {
                    backoff(attempt).await;
                }
            }
        }
    }

    Err(ServiceError::Contention(format!(
        "votes of party `{}` for event `{}`",
        scope.party_id, scope.event_id
    )))
}

/// Same loop for a party document. A missing party is reported as not found.
pub async fn run_party_transaction<T, F>(
    store: &dyn VoteStore,
    party_id: Uuid,
    max_attempts: u32,
    mut mutate: F,
) -> Result<(Party, T), ServiceError>
where
    F: FnMut(&mut Party) -> Result<T, ServiceError>,
{
    let max_attempts = max_attempts.max(1);
    for attempt in 1..=max_attempts {
        let Some(stored) = store.find_party(party_id).await? else {
            return Err(ServiceError::NotFound(format!("party `{party_id}` not found")));
        };
        let mut party = Party::from(stored.value);

        let output = mutate(&mut party)?;

        match store
            .replace_party(PartyEntity::from(party.clone()), stored.revision)
            .await?
        {
            CommitOutcome::Committed(_) => return Ok((party, output)),
            CommitOutcome::Conflict => {
                debug!(%party_id, attempt, "party changed concurrently; retrying");
                if attempt < max_attempts {
                    backoff(attempt).await;
                }
            }
        }
    }

    Err(ServiceError::Contention(format!("party `{party_id}`")))
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::{
        dao::vote_store::memory::InMemoryVoteStore,
        state::{aggregate::Score, party::Member},
    };

    #[tokio::test]
    async fn conflicts_are_retried_until_the_commit_lands() {
        let store = InMemoryVoteStore::new();
        store.force_conflicts(2);
        let scope = VoteScope::new(Uuid::new_v4(), "dt1");
        let mut runs = 0;

        let (votes, ()) = run_event_votes_transaction(&store, &scope, 5, |votes| {
            runs += 1;
            votes.apply_rating("alice", "dt1-1", Score::new(7)?, SystemTime::UNIX_EPOCH);
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(runs, 3);
        assert_eq!(votes.aggregate("dt1-1").count, 1);
        let stored = store
            .find_event_votes(scope.party_id, "dt1".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.value.into_votes().unwrap(), votes);
    }

    #[tokio::test]
    async fn exhausted_attempts_surface_contention() {
        let store = InMemoryVoteStore::new();
        store.force_conflicts(3);
        let scope = VoteScope::new(Uuid::new_v4(), "dt1");

        let result = run_event_votes_transaction(&store, &scope, 3, |_| Ok(())).await;

        assert!(matches!(result, Err(ServiceError::Contention(_))));
        assert!(
            store
                .find_event_votes(scope.party_id, "dt1".into())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn mutation_errors_abort_without_writing() {
        let store = InMemoryVoteStore::new();
        let scope = VoteScope::new(Uuid::new_v4(), "dt1");

        let result: Result<(EventVotes, ()), _> =
            run_event_votes_transaction(&store, &scope, 3, |_| {
                Err(ServiceError::InvalidInput("nope".into()))
            })
            .await;

        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
        assert!(
            store
                .find_event_votes(scope.party_id, "dt1".into())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn party_transactions_report_missing_parties() {
        let store = InMemoryVoteStore::new();
        let result = run_party_transaction(&store, Uuid::new_v4(), 3, |_| Ok(())).await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn party_transactions_persist_changes() {
        let store = InMemoryVoteStore::new();
        let alice = Member {
            id: "alice".into(),
            name: "Alice".into(),
            photo: None,
        };
        let party = Party::new("Soffan".into(), &alice, "ABC234".into(), SystemTime::UNIX_EPOCH);
        let party_id = party.id;
        store.insert_party(party.into()).await.unwrap();

        let bob = Member {
            id: "bob".into(),
            name: "Bob".into(),
            photo: None,
        };
        let (updated, ()) = run_party_transaction(&store, party_id, 3, |party| {
            party.add_member(&bob);
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(updated.members, vec!["alice".to_string(), "bob".to_string()]);
        let stored = store.find_party(party_id).await.unwrap().unwrap();
        assert_eq!(Party::from(stored.value), updated);
    }
}
