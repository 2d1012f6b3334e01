use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dao::models::{EventVotesEntity, PartyEntity};

/// Document id prefixes, one per document kind.
pub const PARTY_PREFIX: &str = "party::";
pub const JOIN_CODE_PREFIX: &str = "joincode::";
pub const VOTES_PREFIX: &str = "votes::";
/// Upper bound appended to a prefix for `_all_docs` range scans.
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Body CouchDB answers with after a successful write.
#[derive(Debug, Deserialize)]
pub struct PutResponse {
    pub rev: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchPartyDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub party: PartyEntity,
}

impl CouchPartyDocument {
    pub fn new(party: PartyEntity, rev: Option<String>) -> Self {
        Self {
            id: party_doc_id(party.id),
            rev,
            party,
        }
    }
}

/// Reservation of a join code. CouchDB refuses a second document with the same id, which
/// makes join codes unique without a secondary index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchJoinCodeDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub party_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchVotesDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub votes: EventVotesEntity,
}

impl CouchVotesDocument {
    pub fn new(votes: EventVotesEntity, rev: Option<String>) -> Self {
        Self {
            id: votes_doc_id(votes.party_id, &votes.event_id),
            rev,
            votes,
        }
    }
}

pub fn party_doc_id(id: Uuid) -> String {
    format!("{PARTY_PREFIX}{id}")
}

pub fn join_code_doc_id(code: &str) -> String {
    format!("{JOIN_CODE_PREFIX}{code}")
}

pub fn votes_doc_id(party_id: Uuid, event_id: &str) -> String {
    format!("{}{event_id}", votes_prefix(party_id))
}

/// Prefix shared by every votes document of a party.
pub fn votes_prefix(party_id: Uuid) -> String {
    format!("{VOTES_PREFIX}{party_id}::")
}
