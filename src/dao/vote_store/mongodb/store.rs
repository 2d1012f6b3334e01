use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::doc,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoEventVotesDocument, MongoPartyDocument, PARTY_COLLECTION_NAME,
        VOTES_COLLECTION_NAME, party_id_filter, votes_doc_id,
    },
};
use crate::dao::{
    models::{CommitOutcome, EventVotesEntity, PartyEntity, Revision, Versioned},
    storage::StorageResult,
    vote_store::VoteStore,
};

const DUPLICATE_KEY: i32 = 11000;

/// [`VoteStore`] backed by MongoDB, using a revision field for compare-and-swap.
#[derive(Clone)]
pub struct MongoVoteStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY
    )
}

/// Stored revisions are integers; anything else can never match.
fn parse_revision(revision: &Revision) -> Option<i64> {
    revision.as_str().parse().ok()
}

impl MongoVoteStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let parties = self.parties().await;
        let join_code_index = IndexModel::builder()
            .keys(doc! { "join_code": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("party_join_code_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        parties
            .create_index(join_code_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PARTY_COLLECTION_NAME,
                index: "join_code",
                source,
            })?;

        let members_index = IndexModel::builder()
            .keys(doc! { "members": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("party_members_idx".to_owned()))
                    .build(),
            )
            .build();
        parties
            .create_index(members_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PARTY_COLLECTION_NAME,
                index: "members",
                source,
            })?;

        let votes_index = IndexModel::builder()
            .keys(doc! { "party_id": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("votes_party_idx".to_owned()))
                    .build(),
            )
            .build();
        self.votes()
            .await
            .create_index(votes_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: VOTES_COLLECTION_NAME,
                index: "party_id",
                source,
            })?;

        Ok(())
    }

    async fn parties(&self) -> Collection<MongoPartyDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoPartyDocument>(PARTY_COLLECTION_NAME)
    }

    async fn votes(&self) -> Collection<MongoEventVotesDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoEventVotesDocument>(VOTES_COLLECTION_NAME)
    }

    async fn find_party_where(
        &self,
        filter: mongodb::bson::Document,
    ) -> MongoResult<Option<Versioned<PartyEntity>>> {
        let document = self
            .parties()
            .await
            .find_one(filter)
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: PARTY_COLLECTION_NAME,
                source,
            })?;

        let Some(document) = document else {
            return Ok(None);
        };
        let revision = Revision::new(document.revision.to_string());
        Ok(Some(Versioned {
            revision,
            value: document.into_entity()?,
        }))
    }

    async fn list_parties_for_member(&self, member_id: &str) -> MongoResult<Vec<PartyEntity>> {
        let documents: Vec<MongoPartyDocument> = self
            .parties()
            .await
            .find(doc! { "members": member_id })
            .sort(doc! { "created_at": 1 })
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: PARTY_COLLECTION_NAME,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: PARTY_COLLECTION_NAME,
                source,
            })?;

        documents
            .into_iter()
            .map(MongoPartyDocument::into_entity)
            .collect()
    }

    async fn insert_party(&self, party: PartyEntity) -> MongoResult<CommitOutcome> {
        let document = MongoPartyDocument::new(party, 1);
        match self.parties().await.insert_one(&document).await {
            Ok(_) => Ok(CommitOutcome::Committed(Revision::new("1"))),
            Err(err) if is_duplicate_key(&err) => {
                debug!(party_id = %document.id, "party insert lost to an existing id or join code");
                Ok(CommitOutcome::Conflict)
            }
            Err(source) => Err(MongoDaoError::Write {
                collection: PARTY_COLLECTION_NAME,
                id: document.id,
                source,
            }),
        }
    }

    async fn replace_party(
        &self,
        party: PartyEntity,
        expected: Revision,
    ) -> MongoResult<CommitOutcome> {
        let Some(expected) = parse_revision(&expected) else {
            return Ok(CommitOutcome::Conflict);
        };
        let next = expected + 1;
        let document = MongoPartyDocument::new(party, next);

        let result = self
            .parties()
            .await
            .replace_one(doc! { "_id": document.id.as_str(), "revision": expected }, &document)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: PARTY_COLLECTION_NAME,
                id: document.id.clone(),
                source,
            })?;

        if result.matched_count == 0 {
            Ok(CommitOutcome::Conflict)
        } else {
            Ok(CommitOutcome::Committed(Revision::new(next.to_string())))
        }
    }

    async fn find_event_votes(
        &self,
        party_id: Uuid,
        event_id: &str,
    ) -> MongoResult<Option<Versioned<EventVotesEntity>>> {
        let document = self
            .votes()
            .await
            .find_one(doc! { "_id": votes_doc_id(party_id, event_id) })
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: VOTES_COLLECTION_NAME,
                source,
            })?;

        let Some(document) = document else {
            return Ok(None);
        };
        let revision = Revision::new(document.revision.to_string());
        Ok(Some(Versioned {
            revision,
            value: document.into_entity()?,
        }))
    }

    async fn commit_event_votes(
        &self,
        votes: EventVotesEntity,
        expected: Option<Revision>,
    ) -> MongoResult<CommitOutcome> {
        let collection = self.votes().await;

        let Some(expected) = expected else {
            let document = MongoEventVotesDocument::new(votes, 1);
            return match collection.insert_one(&document).await {
                Ok(_) => Ok(CommitOutcome::Committed(Revision::new("1"))),
                Err(err) if is_duplicate_key(&err) => Ok(CommitOutcome::Conflict),
                Err(source) => Err(MongoDaoError::Write {
                    collection: VOTES_COLLECTION_NAME,
                    id: document.id,
                    source,
                }),
            };
        };

        let Some(expected) = parse_revision(&expected) else {
            return Ok(CommitOutcome::Conflict);
        };
        let next = expected + 1;
        let document = MongoEventVotesDocument::new(votes, next);
        let result = collection
            .replace_one(doc! { "_id": document.id.as_str(), "revision": expected }, &document)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: VOTES_COLLECTION_NAME,
                id: document.id.clone(),
                source,
            })?;

        if result.matched_count == 0 {
            Ok(CommitOutcome::Conflict)
        } else {
            Ok(CommitOutcome::Committed(Revision::new(next.to_string())))
        }
    }

    async fn list_event_votes(&self, party_id: Uuid) -> MongoResult<Vec<EventVotesEntity>> {
        let documents: Vec<MongoEventVotesDocument> = self
            .votes()
            .await
            .find(doc! { "party_id": party_id.to_string() })
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: VOTES_COLLECTION_NAME,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: VOTES_COLLECTION_NAME,
                source,
            })?;

        documents
            .into_iter()
            .map(MongoEventVotesDocument::into_entity)
            .collect()
    }
}

impl VoteStore for MongoVoteStore {
    fn find_party(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<Versioned<PartyEntity>>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_party_where(party_id_filter(id))
                .await
                .map_err(Into::into)
        })
    }

    fn find_party_by_join_code(
        &self,
        join_code: String,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<PartyEntity>>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_party_where(doc! { "join_code": join_code })
                .await
                .map_err(Into::into)
        })
    }

    fn list_parties_for_member(
        &self,
        member_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<PartyEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_parties_for_member(&member_id)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_party(&self, party: PartyEntity) -> BoxFuture<'static, StorageResult<CommitOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.insert_party(party).await.map_err(Into::into) })
    }

    fn replace_party(
        &self,
        party: PartyEntity,
        expected: Revision,
    ) -> BoxFuture<'static, StorageResult<CommitOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .replace_party(party, expected)
                .await
                .map_err(Into::into)
        })
    }

    fn find_event_votes(
        &self,
        party_id: Uuid,
        event_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<EventVotesEntity>>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_event_votes(party_id, &event_id)
                .await
                .map_err(Into::into)
        })
    }

    fn commit_event_votes(
        &self,
        votes: EventVotesEntity,
        expected: Option<Revision>,
    ) -> BoxFuture<'static, StorageResult<CommitOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .commit_event_votes(votes, expected)
                .await
                .map_err(Into::into)
        })
    }

    fn list_event_votes(&self, party_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<EventVotesEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_event_votes(party_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
