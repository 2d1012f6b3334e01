//! Process-local store used when no database is configured and by the test suites.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use thiserror::Error;
use uuid::Uuid;

use crate::dao::{
    models::{CommitOutcome, EventVotesEntity, PartyEntity, Revision, Versioned},
    storage::{StorageError, StorageResult},
    vote_store::VoteStore,
};

#[derive(Debug, Error)]
#[error("in-memory store is offline")]
struct Offline;

/// Process-local store, used when no database is configured and in tests.
#[derive(Clone, Default)]
pub struct InMemoryVoteStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    parties: DashMap<Uuid, Versioned<PartyEntity>>,
    join_codes: DashMap<String, Uuid>,
    event_votes: DashMap<(Uuid, String), Versioned<EventVotesEntity>>,
    next_revision: AtomicU64,
    offline: AtomicBool,
    forced_conflicts: AtomicU32,
}

impl InMemoryVoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing (or regaining) the database connection.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Make the next `count` vote commits fail with a conflict, as if another writer won.
    pub fn force_conflicts(&self, count: u32) {
        self.inner.forced_conflicts.store(count, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> StorageResult<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            Err(StorageError::unavailable("in-memory store offline".into(), Offline))
        } else {
            Ok(())
        }
    }

    fn next_revision(&self) -> Revision {
        let value = self.inner.next_revision.fetch_add(1, Ordering::SeqCst) + 1;
        Revision::new(value.to_string())
    }

    fn take_forced_conflict(&self) -> bool {
        self.inner
            .forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }

    fn insert_party_now(&self, party: PartyEntity) -> CommitOutcome {
        if self.inner.parties.contains_key(&party.id) {
            return CommitOutcome::Conflict;
        }
        match self.inner.join_codes.entry(party.join_code.clone()) {
            Entry::Occupied(_) => CommitOutcome::Conflict,
            Entry::Vacant(slot) => {
                slot.insert(party.id);
                let revision = self.next_revision();
                self.inner.parties.insert(
                    party.id,
                    Versioned {
                        revision: revision.clone(),
                        value: party,
                    },
                );
                CommitOutcome::Committed(revision)
            }
        }
    }

    fn replace_party_now(&self, party: PartyEntity, expected: Revision) -> CommitOutcome {
        match self.inner.parties.get_mut(&party.id) {
            Some(mut current) if current.revision == expected => {
                let revision = self.next_revision();
                *current = Versioned {
                    revision: revision.clone(),
                    value: party,
                };
                CommitOutcome::Committed(revision)
            }
            _ => CommitOutcome::Conflict,
        }
    }

    fn commit_votes_now(&self, votes: EventVotesEntity, expected: Option<Revision>) -> CommitOutcome {
        if self.take_forced_conflict() {
            return CommitOutcome::Conflict;
        }
        let key = (votes.party_id, votes.event_id.clone());
        match (self.inner.event_votes.entry(key), expected) {
            (Entry::Occupied(mut slot), Some(expected)) if slot.get().revision == expected => {
                let revision = self.next_revision();
                slot.insert(Versioned {
                    revision: revision.clone(),
                    value: votes,
                });
                CommitOutcome::Committed(revision)
            }
            (Entry::Vacant(slot), None) => {
                let revision = self.next_revision();
                slot.insert(Versioned {
                    revision: revision.clone(),
                    value: votes,
                });
                CommitOutcome::Committed(revision)
            }
            _ => CommitOutcome::Conflict,
        }
    }
}

impl VoteStore for InMemoryVoteStore {
    fn find_party(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<Versioned<PartyEntity>>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            Ok(store.inner.parties.get(&id).map(|entry| entry.value().clone()))
        })
    }

    fn find_party_by_join_code(
        &self,
        join_code: String,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<PartyEntity>>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            let Some(party_id) = store.inner.join_codes.get(&join_code).map(|id| *id) else {
                return Ok(None);
            };
            Ok(store
                .inner
                .parties
                .get(&party_id)
                .map(|entry| entry.value().clone()))
        })
    }

    fn list_parties_for_member(
        &self,
        member_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<PartyEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            let mut parties: Vec<PartyEntity> = store
                .inner
                .parties
                .iter()
                .filter(|entry| entry.value().value.members.contains(&member_id))
                .map(|entry| entry.value().value.clone())
                .collect();
            parties.sort_by_key(|party| party.created_at);
            Ok(parties)
        })
    }

    fn insert_party(&self, party: PartyEntity) -> BoxFuture<'static, StorageResult<CommitOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            Ok(store.insert_party_now(party))
        })
    }

    fn replace_party(
        &self,
        party: PartyEntity,
        expected: Revision,
    ) -> BoxFuture<'static, StorageResult<CommitOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            Ok(store.replace_party_now(party, expected))
        })
    }

    fn find_event_votes(
        &self,
        party_id: Uuid,
        event_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<EventVotesEntity>>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            Ok(store
                .inner
                .event_votes
                .get(&(party_id, event_id))
                .map(|entry| entry.value().clone()))
        })
    }

    fn commit_event_votes(
        &self,
        votes: EventVotesEntity,
        expected: Option<Revision>,
    ) -> BoxFuture<'static, StorageResult<CommitOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            Ok(store.commit_votes_now(votes, expected))
        })
    }

    fn list_event_votes(&self, party_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<EventVotesEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            Ok(store
                .inner
                .event_votes
                .iter()
                .filter(|entry| entry.key().0 == party_id)
                .map(|entry| entry.value().value.clone())
                .collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_online() })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_online() })
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::SystemTime};

    use super::*;

    fn party(code: &str) -> PartyEntity {
        PartyEntity {
            id: Uuid::new_v4(),
            name: "Mello-gänget".into(),
            created_by: "alice".into(),
            join_code: code.into(),
            members: vec!["alice".into()],
            member_names: HashMap::new(),
            member_photos: HashMap::new(),
            created_at: SystemTime::UNIX_EPOCH,
        }
    }

    fn votes(party_id: Uuid) -> EventVotesEntity {
        EventVotesEntity {
            party_id,
            event_id: "dt1".into(),
            aggregates: Default::default(),
            voter_ids: vec![],
            ballots: Default::default(),
        }
    }

    #[tokio::test]
    async fn join_codes_are_unique() {
        let store = InMemoryVoteStore::new();
        let first = store.insert_party(party("ABC123")).await.unwrap();
        let second = store.insert_party(party("ABC123")).await.unwrap();

        assert!(matches!(first, CommitOutcome::Committed(_)));
        assert_eq!(second, CommitOutcome::Conflict);
        assert!(
            store
                .find_party_by_join_code("ABC123".into())
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn stale_revisions_conflict() {
        let store = InMemoryVoteStore::new();
        let party_id = Uuid::new_v4();

        let CommitOutcome::Committed(first) =
            store.commit_event_votes(votes(party_id), None).await.unwrap()
        else {
            panic!("first commit should succeed");
        };
        assert_eq!(
            store.commit_event_votes(votes(party_id), None).await.unwrap(),
            CommitOutcome::Conflict
        );
        let CommitOutcome::Committed(second) = store
            .commit_event_votes(votes(party_id), Some(first.clone()))
            .await
            .unwrap()
        else {
            panic!("commit at the current revision should succeed");
        };
        assert_ne!(first, second);
        assert_eq!(
            store
                .commit_event_votes(votes(party_id), Some(first))
                .await
                .unwrap(),
            CommitOutcome::Conflict
        );
    }

    #[tokio::test]
    async fn forced_conflicts_are_consumed_one_by_one() {
        let store = InMemoryVoteStore::new();
        store.force_conflicts(1);
        let party_id = Uuid::new_v4();

        assert_eq!(
            store.commit_event_votes(votes(party_id), None).await.unwrap(),
            CommitOutcome::Conflict
        );
        assert!(matches!(
            store.commit_event_votes(votes(party_id), None).await.unwrap(),
            CommitOutcome::Committed(_)
        ));
    }

    #[tokio::test]
    async fn offline_store_reports_unavailable() {
        let store = InMemoryVoteStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.health_check().await,
            Err(StorageError::Unavailable { .. })
        ));
        store.set_offline(false);
        assert!(store.health_check().await.is_ok());
    }
}
