use std::{collections::BTreeMap, collections::HashMap, fmt, time::SystemTime};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    dao::storage::StorageError,
    state::{
        aggregate::{Ballot, EventVotes, Score, VoteAggregate},
        party::Party,
    },
};

/// Opaque version token of a stored document, compared on every conditional write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document together with the revision it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub revision: Revision,
    pub value: T,
}

/// Result of a compare-and-swap write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The write went through and the document now carries this revision.
    Committed(Revision),
    /// Someone else wrote first (or the document already exists); nothing was written.
    Conflict,
}

/// Party document shared by every backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartyEntity {
    pub id: Uuid,
    pub name: String,
    pub created_by: String,
    /// Upper-case, unique across parties.
    pub join_code: String,
    pub members: Vec<String>,
    pub member_names: HashMap<String, String>,
    pub member_photos: HashMap<String, Option<String>>,
    pub created_at: SystemTime,
}

/// Stored totals of one entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct VoteAggregateEntity {
    pub sum: u32,
    pub count: u32,
    pub avg: f64,
}

/// Stored ballot of one member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserVoteEntity {
    pub member_id: String,
    pub ratings: BTreeMap<String, u8>,
    pub favorite: Option<String>,
    pub voted_at: SystemTime,
    pub updated_at: SystemTime,
}

/// Ballots and aggregates of one party for one event, stored as a single document so
/// one conditional write keeps both consistent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventVotesEntity {
    pub party_id: Uuid,
    pub event_id: String,
    pub aggregates: BTreeMap<String, VoteAggregateEntity>,
    pub voter_ids: Vec<String>,
    pub ballots: BTreeMap<String, UserVoteEntity>,
}

impl From<Party> for PartyEntity {
    fn from(party: Party) -> Self {
        Self {
            id: party.id,
            name: party.name,
            created_by: party.created_by,
            join_code: party.join_code,
            members: party.members,
            member_names: party.member_names,
            member_photos: party.member_photos,
            created_at: party.created_at,
        }
    }
}

impl From<PartyEntity> for Party {
    fn from(entity: PartyEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            created_by: entity.created_by,
            join_code: entity.join_code,
            members: entity.members,
            member_names: entity.member_names,
            member_photos: entity.member_photos,
            created_at: entity.created_at,
        }
    }
}

impl EventVotesEntity {
    /// Snapshot the domain votes of a scope for storage.
    pub fn from_votes(party_id: Uuid, event_id: &str, votes: &EventVotes) -> Self {
        Self {
            party_id,
            event_id: event_id.to_owned(),
            aggregates: votes
                .aggregates
                .iter()
                .map(|(entry_id, aggregate)| {
                    (
                        entry_id.clone(),
                        VoteAggregateEntity {
                            sum: aggregate.sum,
                            count: aggregate.count,
                            avg: aggregate.avg,
                        },
                    )
                })
                .collect(),
            voter_ids: votes.voter_ids.clone(),
            ballots: votes
                .ballots
                .iter()
                .map(|(member_id, ballot)| {
                    (
                        member_id.clone(),
                        UserVoteEntity {
                            member_id: ballot.member_id.clone(),
                            ratings: ballot
                                .ratings
                                .iter()
                                .map(|(entry_id, score)| (entry_id.clone(), score.get()))
                                .collect(),
                            favorite: ballot.favorite.clone(),
                            voted_at: ballot.voted_at,
                            updated_at: ballot.updated_at,
                        },
                    )
                })
                .collect(),
        }
    }

    /// Turn the stored document back into domain votes, refusing ratings off the scale.
    pub fn into_votes(self) -> Result<EventVotes, StorageError> {
        let mut ballots = BTreeMap::new();
        for (member_id, stored) in self.ballots {
            let mut ratings = BTreeMap::new();
            for (entry_id, value) in stored.ratings {
                let score = Score::new(i64::from(value)).map_err(|err| {
                    StorageError::corrupted(format!(
                        "votes of party `{}` for event `{}`: {err}",
                        self.party_id, self.event_id
                    ))
                })?;
                ratings.insert(entry_id, score);
            }
            ballots.insert(
                member_id,
                Ballot {
                    member_id: stored.member_id,
                    ratings,
                    favorite: stored.favorite,
                    voted_at: stored.voted_at,
                    updated_at: stored.updated_at,
                },
            );
        }

        Ok(EventVotes {
            aggregates: self
                .aggregates
                .into_iter()
                .map(|(entry_id, stored)| {
                    (
                        entry_id,
                        VoteAggregate {
                            sum: stored.sum,
                            count: stored.count,
                            avg: stored.avg,
                        },
                    )
                })
                .collect(),
            voter_ids: self.voter_ids,
            ballots,
        })
    }
}
