use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::from_value;
use uuid::Uuid;

use crate::dao::{
    models::{CommitOutcome, EventVotesEntity, PartyEntity, Revision, Versioned},
    storage::StorageResult,
    vote_store::VoteStore,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, CouchJoinCodeDocument, CouchPartyDocument, CouchVotesDocument,
        END_SUFFIX, PARTY_PREFIX, PutResponse, join_code_doc_id, party_doc_id, votes_doc_id,
        votes_prefix,
    },
};

/// CouchDB-backed store. Every conditional write relies on CouchDB's `_rev` MVCC: a PUT
/// carrying a stale (or missing) revision is answered with `409 Conflict`.
#[derive(Clone)]
pub struct CouchVoteStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchVoteStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth {
            Some((ref user, ref pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.authorize(self.client.request(method, url))
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url();

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorize(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                // 412 means another instance created it in the meantime.
                if create.status().is_success() || create.status() == StatusCode::PRECONDITION_FAILED {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// PUT a document; a `409` is a lost race, not a failure.
    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<CommitOutcome>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Ok(CommitOutcome::Conflict),
            status if status.is_success() => {
                let body = response.json::<PutResponse>().await.map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })?;
                Ok(CommitOutcome::Committed(Revision::new(body.rev)))
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn list_documents<T>(&self, prefix: &str) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        const ALL_DOCS: &str = "_all_docs";
        let query = [
            ("include_docs", "true".to_string()),
            ("startkey", format!("\"{}\"", prefix)),
            ("endkey", format!("\"{}{}\"", prefix, END_SUFFIX)),
        ];

        let response = self
            .request(Method::GET, ALL_DOCS)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: ALL_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: ALL_DOCS.to_string(),
                status: response.status(),
            });
        }

        let payload = response.json::<AllDocsResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_string(),
                source,
            }
        })?;

        payload
            .rows
            .into_iter()
            .filter_map(|row| row.doc)
            .map(|doc| {
                from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                    path: ALL_DOCS.to_string(),
                    source,
                })
            })
            .collect()
    }

    async fn load_party(&self, id: Uuid) -> CouchResult<Option<Versioned<PartyEntity>>> {
        let doc_id = party_doc_id(id);
        let Some(doc) = self.get_document::<CouchPartyDocument>(&doc_id).await? else {
            return Ok(None);
        };
        let revision = doc
            .rev
            .ok_or(CouchDaoError::MissingRevision { path: doc_id })?;
        Ok(Some(Versioned {
            revision: Revision::new(revision),
            value: doc.party,
        }))
    }
}

impl VoteStore for CouchVoteStore {
    fn find_party(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<Versioned<PartyEntity>>>> {
        let store = self.clone();
        Box::pin(async move { store.load_party(id).await.map_err(Into::into) })
    }

    fn find_party_by_join_code(
        &self,
        join_code: String,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<PartyEntity>>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = join_code_doc_id(&join_code);
            let Some(reservation) = store
                .get_document::<CouchJoinCodeDocument>(&doc_id)
                .await?
            else {
                return Ok(None);
            };
            Ok(store.load_party(reservation.party_id).await?)
        })
    }

    fn list_parties_for_member(
        &self,
        member_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<PartyEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store
                .list_documents::<CouchPartyDocument>(PARTY_PREFIX)
                .await?;
            let mut parties: Vec<PartyEntity> = docs
                .into_iter()
                .map(|doc| doc.party)
                .filter(|party| party.members.contains(&member_id))
                .collect();
            parties.sort_by_key(|party| party.created_at);
            Ok(parties)
        })
    }

    fn insert_party(&self, party: PartyEntity) -> BoxFuture<'static, StorageResult<CommitOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            let reservation_id = join_code_doc_id(&party.join_code);
            let reservation = CouchJoinCodeDocument {
                id: reservation_id.clone(),
                rev: None,
                party_id: party.id,
            };
            if store.put_document(&reservation_id, &reservation).await? == CommitOutcome::Conflict {
                return Ok(CommitOutcome::Conflict);
            }

            let doc = CouchPartyDocument::new(party, None);
            Ok(store.put_document(&doc.id, &doc).await?)
        })
    }

    fn replace_party(
        &self,
        party: PartyEntity,
        expected: Revision,
    ) -> BoxFuture<'static, StorageResult<CommitOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = CouchPartyDocument::new(party, Some(expected.as_str().to_owned()));
            Ok(store.put_document(&doc.id, &doc).await?)
        })
    }

    fn find_event_votes(
        &self,
        party_id: Uuid,
        event_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<EventVotesEntity>>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = votes_doc_id(party_id, &event_id);
            let Some(doc) = store.get_document::<CouchVotesDocument>(&doc_id).await? else {
                return Ok(None);
            };
            let revision = doc
                .rev
                .ok_or(CouchDaoError::MissingRevision { path: doc_id })?;
            Ok(Some(Versioned {
                revision: Revision::new(revision),
                value: doc.votes,
            }))
        })
    }

    fn commit_event_votes(
        &self,
        votes: EventVotesEntity,
        expected: Option<Revision>,
    ) -> BoxFuture<'static, StorageResult<CommitOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            let rev = expected.map(|revision| revision.as_str().to_owned());
            let doc = CouchVotesDocument::new(votes, rev);
            Ok(store.put_document(&doc.id, &doc).await?)
        })
    }

    fn list_event_votes(&self, party_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<EventVotesEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store
                .list_documents::<CouchVotesDocument>(&votes_prefix(party_id))
                .await?;
            Ok(docs.into_iter().map(|doc| doc.votes).collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.database_url();
            let response = store
                .authorize(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
