use std::collections::{BTreeMap, HashMap};

use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{EventVotesEntity, PartyEntity, UserVoteEntity, VoteAggregateEntity};

use super::error::{MongoDaoError, MongoResult};

pub const PARTY_COLLECTION_NAME: &str = "parties";
pub const VOTES_COLLECTION_NAME: &str = "event_votes";

/// Party document. `revision` is bumped on every write and guards the conditional replace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPartyDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub revision: i64,
    name: String,
    created_by: String,
    join_code: String,
    members: Vec<String>,
    member_names: HashMap<String, String>,
    #[serde(default)]
    member_photos: HashMap<String, Option<String>>,
    created_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MongoAggregate {
    sum: i64,
    count: i64,
    avg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MongoBallot {
    member_id: String,
    ratings: BTreeMap<String, i32>,
    favorite: Option<String>,
    voted_at: DateTime,
    updated_at: DateTime,
}

/// One party's votes for one event, keyed `{party}:{event}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoEventVotesDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub revision: i64,
    party_id: String,
    event_id: String,
    aggregates: BTreeMap<String, MongoAggregate>,
    voter_ids: Vec<String>,
    ballots: BTreeMap<String, MongoBallot>,
}

pub fn party_id_filter(id: Uuid) -> Document {
    doc! { "_id": id.to_string() }
}

pub fn votes_doc_id(party_id: Uuid, event_id: &str) -> String {
    format!("{party_id}:{event_id}")
}

fn invalid(collection: &'static str, id: &str, reason: impl Into<String>) -> MongoDaoError {
    MongoDaoError::InvalidDocument {
        collection,
        id: id.to_owned(),
        reason: reason.into(),
    }
}

fn parse_uuid(collection: &'static str, id: &str, raw: &str) -> MongoResult<Uuid> {
    Uuid::parse_str(raw).map_err(|err| invalid(collection, id, err.to_string()))
}

impl MongoPartyDocument {
    pub fn new(party: PartyEntity, revision: i64) -> Self {
        Self {
            id: party.id.to_string(),
            revision,
            name: party.name,
            created_by: party.created_by,
            join_code: party.join_code,
            members: party.members,
            member_names: party.member_names,
            member_photos: party.member_photos,
            created_at: DateTime::from_system_time(party.created_at),
        }
    }

    pub fn into_entity(self) -> MongoResult<PartyEntity> {
        let id = parse_uuid(PARTY_COLLECTION_NAME, &self.id, &self.id)?;
        Ok(PartyEntity {
            id,
            name: self.name,
            created_by: self.created_by,
            join_code: self.join_code,
            members: self.members,
            member_names: self.member_names,
            member_photos: self.member_photos,
            created_at: self.created_at.to_system_time(),
        })
    }
}

impl MongoEventVotesDocument {
    pub fn new(votes: EventVotesEntity, revision: i64) -> Self {
        Self {
            id: votes_doc_id(votes.party_id, &votes.event_id),
            revision,
            party_id: votes.party_id.to_string(),
            event_id: votes.event_id,
            aggregates: votes
                .aggregates
                .into_iter()
                .map(|(entry_id, aggregate)| {
                    (
                        entry_id,
                        MongoAggregate {
                            sum: i64::from(aggregate.sum),
                            count: i64::from(aggregate.count),
                            avg: aggregate.avg,
                        },
                    )
                })
                .collect(),
            voter_ids: votes.voter_ids,
            ballots: votes
                .ballots
                .into_iter()
                .map(|(member_id, ballot)| {
                    (
                        member_id,
                        MongoBallot {
                            member_id: ballot.member_id,
                            ratings: ballot
                                .ratings
                                .into_iter()
                                .map(|(entry_id, score)| (entry_id, i32::from(score)))
                                .collect(),
                            favorite: ballot.favorite,
                            voted_at: DateTime::from_system_time(ballot.voted_at),
                            updated_at: DateTime::from_system_time(ballot.updated_at),
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn into_entity(self) -> MongoResult<EventVotesEntity> {
        let doc_id = self.id;
        let party_id = parse_uuid(VOTES_COLLECTION_NAME, &doc_id, &self.party_id)?;

        let mut aggregates = BTreeMap::new();
        for (entry_id, stored) in self.aggregates {
            let (Ok(sum), Ok(count)) = (u32::try_from(stored.sum), u32::try_from(stored.count))
            else {
                return Err(invalid(
                    VOTES_COLLECTION_NAME,
                    &doc_id,
                    format!("negative totals for entry `{entry_id}`"),
                ));
            };
            aggregates.insert(
                entry_id,
                VoteAggregateEntity {
                    sum,
                    count,
                    avg: stored.avg,
                },
            );
        }

        let mut ballots = BTreeMap::new();
        for (member_id, stored) in self.ballots {
            let mut ratings = BTreeMap::new();
            for (entry_id, value) in stored.ratings {
                let value = u8::try_from(value).map_err(|_| {
                    invalid(
                        VOTES_COLLECTION_NAME,
                        &doc_id,
                        format!("rating {value} of `{member_id}` is not a byte"),
                    )
                })?;
                ratings.insert(entry_id, value);
            }
            ballots.insert(
                member_id,
                UserVoteEntity {
                    member_id: stored.member_id,
                    ratings,
                    favorite: stored.favorite,
                    voted_at: stored.voted_at.to_system_time(),
                    updated_at: stored.updated_at.to_system_time(),
                },
            );
        }

        Ok(EventVotesEntity {
            party_id,
            event_id: self.event_id,
            aggregates,
            voter_ids: self.voter_ids,
            ballots,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;

    fn votes() -> EventVotesEntity {
        let at = SystemTime::UNIX_EPOCH + Duration::from_secs(1_770_000_000);
        EventVotesEntity {
            party_id: Uuid::new_v4(),
            event_id: "dt1".into(),
            aggregates: BTreeMap::from([(
                "dt1-1".to_string(),
                VoteAggregateEntity {
                    sum: 15,
                    count: 2,
                    avg: 7.5,
                },
            )]),
            voter_ids: vec!["alice".into(), "bob".into()],
            ballots: BTreeMap::from([(
                "alice".to_string(),
                UserVoteEntity {
                    member_id: "alice".into(),
                    ratings: BTreeMap::from([("dt1-1".to_string(), 7)]),
                    favorite: Some("dt1-1".into()),
                    voted_at: at,
                    updated_at: at,
                },
            )]),
        }
    }

    #[test]
    fn votes_document_is_keyed_by_party_and_event() {
        let entity = votes();
        let doc = MongoEventVotesDocument::new(entity.clone(), 3);
        assert_eq!(doc.id, format!("{}:dt1", entity.party_id));
        assert_eq!(doc.revision, 3);
        assert_eq!(doc.into_entity().unwrap(), entity);
    }

    #[test]
    fn negative_counts_are_rejected() {
        let mut doc = MongoEventVotesDocument::new(votes(), 1);
        if let Some(aggregate) = doc.aggregates.get_mut("dt1-1") {
            aggregate.count = -1;
        }
        assert!(matches!(
            doc.into_entity(),
            Err(MongoDaoError::InvalidDocument { .. })
        ));
    }
}
