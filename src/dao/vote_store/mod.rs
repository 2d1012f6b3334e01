#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{CommitOutcome, EventVotesEntity, PartyEntity, Revision, Versioned};
use crate::dao::storage::StorageResult;

/// Abstraction over the persistence layer for parties and their votes.
///
/// Writes are conditional: `expected` is the revision the caller read, or `None` when the
/// caller saw no document. A stale or missing revision yields [`CommitOutcome::Conflict`].
pub trait VoteStore: Send + Sync {
    fn find_party(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<Versioned<PartyEntity>>>>;
    fn find_party_by_join_code(
        &self,
        join_code: String,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<PartyEntity>>>>;
    fn list_parties_for_member(
        &self,
        member_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<PartyEntity>>>;
    /// Create a party; conflicts when the id or the join code is already taken.
    fn insert_party(&self, party: PartyEntity) -> BoxFuture<'static, StorageResult<CommitOutcome>>;
    fn replace_party(
        &self,
        party: PartyEntity,
        expected: Revision,
    ) -> BoxFuture<'static, StorageResult<CommitOutcome>>;
    fn find_event_votes(
        &self,
        party_id: Uuid,
        event_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<EventVotesEntity>>>>;
    fn commit_event_votes(
        &self,
        votes: EventVotesEntity,
        expected: Option<Revision>,
    ) -> BoxFuture<'static, StorageResult<CommitOutcome>>;
    fn list_event_votes(&self, party_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<EventVotesEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
