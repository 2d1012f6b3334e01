use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{format_system_time, validation::validate_ratings},
    state::{
        aggregate::{Ballot, VoteAggregate},
        schedule::EventStatus,
    },
};

/// Replace the caller's whole ballot for an event.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SubmitBallotRequest {
    /// Entry id to rating (1 to 10).
    #[validate(custom(function = "validate_ratings"))]
    pub ratings: BTreeMap<String, i64>,
    #[serde(default)]
    pub favorite: Option<String>,
}

/// Rate a single entry.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SubmitRatingRequest {
    #[validate(range(min = 1, max = 10))]
    pub score: i64,
}

/// Set (or clear with `null`) the caller's favorite entry.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitFavoriteRequest {
    pub favorite: Option<String>,
}

/// One member's ballot. Empty when the member has not voted yet.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BallotView {
    pub event_id: String,
    pub member_id: String,
    pub ratings: BTreeMap<String, u8>,
    pub favorite: Option<String>,
    /// RFC 3339 timestamp of the first submission.
    pub voted_at: Option<String>,
    /// RFC 3339 timestamp of the last change.
    pub updated_at: Option<String>,
}

impl BallotView {
    pub fn new(event_id: &str, member_id: &str, ballot: Option<&Ballot>) -> Self {
        Self {
            event_id: event_id.to_owned(),
            member_id: member_id.to_owned(),
            ratings: ballot
                .map(|ballot| {
                    ballot
                        .ratings
                        .iter()
                        .map(|(entry_id, score)| (entry_id.clone(), score.get()))
                        .collect()
                })
                .unwrap_or_default(),
            favorite: ballot.and_then(|ballot| ballot.favorite.clone()),
            voted_at: ballot.map(|ballot| format_system_time(ballot.voted_at)),
            updated_at: ballot.map(|ballot| format_system_time(ballot.updated_at)),
        }
    }
}

/// Totals of one entry.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AggregateView {
    pub entry_id: String,
    pub sum: u32,
    pub count: u32,
    /// Rounded half up to one decimal; 0 without votes.
    pub avg: f64,
}

impl AggregateView {
    pub fn new(entry_id: &str, aggregate: VoteAggregate) -> Self {
        Self {
            entry_id: entry_id.to_owned(),
            sum: aggregate.sum,
            count: aggregate.count,
            avg: aggregate.avg,
        }
    }
}

/// Whether a member already voted.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MemberProgress {
    pub id: String,
    pub name: String,
    pub voted: bool,
}

/// How many current members already voted.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VoteProgress {
    pub voted: usize,
    pub total: usize,
    pub members: Vec<MemberProgress>,
}

/// A member's view of a party's votes for one event.
///
/// Aggregates stay hidden until the results are revealed.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EventVotesView {
    pub party_id: Uuid,
    pub event_id: String,
    pub status: EventStatus,
    pub revealed: bool,
    pub progress: VoteProgress,
    /// Per-entry totals in line-up order; present only once revealed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregates: Option<Vec<AggregateView>>,
    pub own_ballot: BallotView,
}
