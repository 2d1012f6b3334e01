//! Per (party, event) ballots and the aggregates derived from them.
//!
//! Everything here is pure: the vote service loads an [`EventVotes`] snapshot, applies one
//! of the `apply_*` operations and commits the result through the store's compare-and-swap.

use std::{collections::BTreeMap, time::SystemTime};

use thiserror::Error;

use crate::state::{
    catalog::{EntryId, MemberId},
    schedule::EventStatus,
};

/// Lowest accepted rating.
pub const MIN_SCORE: u8 = 1;
/// Highest accepted rating.
pub const MAX_SCORE: u8 = 10;

/// Raised when a rating falls outside `MIN_SCORE..=MAX_SCORE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rating {0} is outside {MIN_SCORE}..={MAX_SCORE}")]
pub struct ScoreOutOfRange(pub i64);

/// A rating known to lie within the accepted scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Score(u8);

impl Score {
    /// Validate a raw rating.
    pub fn new(value: i64) -> Result<Self, ScoreOutOfRange> {
        if (i64::from(MIN_SCORE)..=i64::from(MAX_SCORE)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ScoreOutOfRange(value))
        }
    }

    /// The rating as a plain number.
    pub fn get(self) -> u8 {
        self.0
    }
}

/// Average of `sum / count` rounded half up to one decimal.
///
/// Computed on integers so ties such as 6.25 always round to 6.3.
pub fn average_one_decimal(sum: u32, count: u32) -> f64 {
    if count == 0 {
        return 0.0;
    }
    let (sum, count) = (u64::from(sum), u64::from(count));
    let tenths = (sum * 20 + count) / (count * 2);
    tenths as f64 / 10.0
}

/// Running totals for one entry.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VoteAggregate {
    /// Sum of every rating given to the entry.
    pub sum: u32,
    /// Number of members that rated the entry.
    pub count: u32,
    /// `sum / count` rounded half up to one decimal, `0.0` without ratings.
    pub avg: f64,
}

impl VoteAggregate {
    /// Aggregate with the average derived from the totals.
    pub fn from_totals(sum: u32, count: u32) -> Self {
        Self {
            sum,
            count,
            avg: average_one_decimal(sum, count),
        }
    }

    fn add(&mut self, score: Score) {
        *self = Self::from_totals(self.sum + u32::from(score.get()), self.count + 1);
    }

    fn replace(&mut self, old: Score, new: Score) {
        let sum = (self.sum + u32::from(new.get())).saturating_sub(u32::from(old.get()));
        *self = Self::from_totals(sum, self.count);
    }

    fn remove(&mut self, old: Score) {
        *self = Self::from_totals(
            self.sum.saturating_sub(u32::from(old.get())),
            self.count.saturating_sub(1),
        );
    }
}

/// One member's ballot for an event.
#[derive(Debug, Clone, PartialEq)]
pub struct Ballot {
    pub member_id: MemberId,
    pub ratings: BTreeMap<EntryId, Score>,
    pub favorite: Option<EntryId>,
    /// First submission; kept across edits.
    pub voted_at: SystemTime,
    pub updated_at: SystemTime,
}

impl Ballot {
    fn new(member_id: &str, now: SystemTime) -> Self {
        Self {
            member_id: member_id.to_owned(),
            ratings: BTreeMap::new(),
            favorite: None,
            voted_at: now,
            updated_at: now,
        }
    }

    /// A ballot with neither ratings nor a favorite does not count as participation.
    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty() && self.favorite.is_none()
    }
}

/// Ballots and aggregates of one party for one event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventVotes {
    pub aggregates: BTreeMap<EntryId, VoteAggregate>,
    /// Members that submitted anything, in order of first participation.
    pub voter_ids: Vec<MemberId>,
    /// Every member's ballot, keyed by member id.
    pub ballots: BTreeMap<MemberId, Ballot>,
}

impl EventVotes {
    /// Totals of an entry, empty when nobody rated it.
    pub fn aggregate(&self, entry_id: &str) -> VoteAggregate {
        self.aggregates.get(entry_id).copied().unwrap_or_default()
    }

    /// Ballot of a member, if they submitted anything.
    pub fn ballot(&self, member_id: &str) -> Option<&Ballot> {
        self.ballots.get(member_id)
    }

    /// Whether a member took part in this event's vote.
    pub fn has_voted(&self, member_id: &str) -> bool {
        self.voter_ids.iter().any(|voter| voter == member_id)
    }

    /// Rate a single entry, leaving the rest of the member's ballot untouched.
    pub fn apply_rating(&mut self, member_id: &str, entry_id: &str, score: Score, now: SystemTime) {
        let previous = self
            .ballots
            .get(member_id)
            .and_then(|ballot| ballot.ratings.get(entry_id))
            .copied();

        let aggregate = self.aggregates.entry(entry_id.to_owned()).or_default();
        match previous {
            Some(old) => aggregate.replace(old, score),
            None => aggregate.add(score),
        }

        let ballot = self.ballot_mut(member_id, now);
        ballot.ratings.insert(entry_id.to_owned(), score);
        ballot.updated_at = now;
        self.register_voter(member_id);
    }

    /// Replace the member's whole ballot, backing out every previous rating first.
    pub fn apply_full_ballot(
        &mut self,
        member_id: &str,
        ratings: BTreeMap<EntryId, Score>,
        favorite: Option<EntryId>,
        now: SystemTime,
    ) {
        if let Some(previous) = self.ballots.get(member_id) {
            for (entry_id, old) in &previous.ratings {
                if let Some(aggregate) = self.aggregates.get_mut(entry_id) {
                    aggregate.remove(*old);
                }
            }
            self.aggregates.retain(|_, aggregate| aggregate.count > 0);
        }

        for (entry_id, score) in &ratings {
            self.aggregates
                .entry(entry_id.clone())
                .or_default()
                .add(*score);
        }

        let ballot = self.ballot_mut(member_id, now);
        ballot.ratings = ratings;
        ballot.favorite = favorite;
        ballot.updated_at = now;
        let participated = !ballot.is_empty();
        if participated {
            self.register_voter(member_id);
        }
    }

    /// Set or clear the member's favorite. Aggregates are not affected.
    pub fn apply_favorite(&mut self, member_id: &str, favorite: Option<EntryId>, now: SystemTime) {
        let ballot = self.ballot_mut(member_id, now);
        ballot.favorite = favorite;
        ballot.updated_at = now;
        self.register_voter(member_id);
    }

    /// Rebuild aggregates and voters from ballots alone.
    pub fn replay(ballots: impl IntoIterator<Item = Ballot>) -> Self {
        let mut votes = Self::default();
        for ballot in ballots {
            for (entry_id, score) in &ballot.ratings {
                votes
                    .aggregates
                    .entry(entry_id.clone())
                    .or_default()
                    .add(*score);
            }
            if !ballot.is_empty() {
                votes.register_voter(&ballot.member_id);
            }
            votes.ballots.insert(ballot.member_id.clone(), ballot);
        }
        votes
    }

    fn ballot_mut(&mut self, member_id: &str, now: SystemTime) -> &mut Ballot {
        self.ballots
            .entry(member_id.to_owned())
            .or_insert_with(|| Ballot::new(member_id, now))
    }

    fn register_voter(&mut self, member_id: &str) {
        if !self.has_voted(member_id) {
            self.voter_ids.push(member_id.to_owned());
        }
    }
}

/// Number of current members that already voted.
pub fn voted_member_count(voter_ids: &[MemberId], members: &[MemberId]) -> usize {
    members
        .iter()
        .filter(|member| voter_ids.contains(member))
        .count()
}

/// Whether a party may see everyone's results for an event.
pub fn is_revealed(voter_ids: &[MemberId], members: &[MemberId], status: EventStatus) -> bool {
    if status.reveals_results() {
        return true;
    }
    !members.is_empty() && voted_member_count(voter_ids, members) >= members.len()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::*;

    fn score(value: i64) -> Score {
        Score::new(value).unwrap()
    }

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn ratings(pairs: &[(&str, i64)]) -> BTreeMap<EntryId, Score> {
        pairs
            .iter()
            .map(|(entry, value)| (entry.to_string(), score(*value)))
            .collect()
    }

    fn member_ids(ids: &[&str]) -> Vec<MemberId> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    fn assert_matches_replay(votes: &EventVotes) {
        let replayed = EventVotes::replay(votes.ballots.values().cloned());
        assert_eq!(votes.aggregates, replayed.aggregates);
        let mut voters = votes.voter_ids.clone();
        let mut replayed_voters = replayed.voter_ids.clone();
        voters.sort();
        replayed_voters.sort();
        assert_eq!(voters, replayed_voters);
    }

    #[test]
    fn scores_outside_the_scale_are_rejected() {
        assert!(Score::new(0).is_err());
        assert!(Score::new(11).is_err());
        assert!(Score::new(-3).is_err());
        assert_eq!(Score::new(1).unwrap().get(), 1);
        assert_eq!(Score::new(10).unwrap().get(), 10);
    }

    #[test]
    fn averages_round_half_up() {
        assert_eq!(average_one_decimal(25, 4), 6.3);
        assert_eq!(average_one_decimal(3, 2), 1.5);
        assert_eq!(average_one_decimal(10, 3), 3.3);
        assert_eq!(average_one_decimal(20, 3), 6.7);
        assert_eq!(average_one_decimal(0, 0), 0.0);
    }

    #[test]
    fn replacing_a_rating_keeps_the_count() {
        let mut votes = EventVotes::default();
        votes.apply_rating("alice", "dt1-1", score(5), at(1));
        votes.apply_rating("bob", "dt1-1", score(7), at(2));
        votes.apply_rating("alice", "dt1-1", score(9), at(3));

        assert_eq!(votes.aggregate("dt1-1"), VoteAggregate::from_totals(16, 2));
        assert_eq!(votes.aggregate("dt1-1").avg, 8.0);
    }

    #[test]
    fn single_rating_preserves_the_rest_of_the_ballot() {
        let mut votes = EventVotes::default();
        votes.apply_full_ballot(
            "alice",
            ratings(&[("dt1-1", 4), ("dt1-2", 6)]),
            Some("dt1-2".into()),
            at(1),
        );
        votes.apply_rating("alice", "dt1-1", score(8), at(5));

        let ballot = votes.ballot("alice").unwrap();
        assert_eq!(ballot.ratings, ratings(&[("dt1-1", 8), ("dt1-2", 6)]));
        assert_eq!(ballot.favorite.as_deref(), Some("dt1-2"));
        assert_eq!(ballot.voted_at, at(1));
        assert_eq!(ballot.updated_at, at(5));
    }

    #[test]
    fn resubmitting_the_same_ballot_is_idempotent() {
        let mut votes = EventVotes::default();
        let ballot = ratings(&[("dt1-1", 6), ("dt1-2", 7)]);
        votes.apply_full_ballot("alice", ballot.clone(), None, at(1));
        votes.apply_full_ballot("bob", ratings(&[("dt1-1", 6)]), None, at(2));
        let before = votes.aggregates.clone();

        votes.apply_full_ballot("alice", ballot, None, at(3));

        assert_eq!(votes.aggregates, before);
        assert_eq!(votes.voter_ids, member_ids(&["alice", "bob"]));
    }

    #[test]
    fn full_ballot_backs_out_dropped_ratings() {
        let mut votes = EventVotes::default();
        votes.apply_full_ballot(
            "alice",
            ratings(&[("dt1-1", 6), ("dt1-2", 7)]),
            None,
            at(1),
        );
        votes.apply_full_ballot("alice", ratings(&[("dt1-1", 9)]), None, at(2));

        assert_eq!(votes.aggregate("dt1-1"), VoteAggregate::from_totals(9, 1));
        assert!(!votes.aggregates.contains_key("dt1-2"));
        assert_matches_replay(&votes);
    }

    #[test]
    fn tie_example_rounds_up() {
        let mut votes = EventVotes::default();
        for (member, value) in [("a", 6), ("b", 6), ("c", 6), ("d", 7)] {
            votes.apply_rating(member, "dt5-6", score(value), at(1));
        }
        let aggregate = votes.aggregate("dt5-6");
        assert_eq!((aggregate.sum, aggregate.count), (25, 4));
        assert_eq!(aggregate.avg, 6.3);
    }

    #[test]
    fn favorite_only_registers_the_voter_once() {
        let mut votes = EventVotes::default();
        votes.apply_rating("bob", "dt1-1", score(4), at(1));
        let aggregates = votes.aggregates.clone();

        votes.apply_favorite("alice", Some("dt1-3".into()), at(2));
        votes.apply_favorite("alice", Some("dt1-4".into()), at(3));

        assert_eq!(votes.aggregates, aggregates);
        assert_eq!(votes.voter_ids, member_ids(&["bob", "alice"]));
        assert_eq!(
            votes.ballot("alice").unwrap().favorite.as_deref(),
            Some("dt1-4")
        );
    }

    #[test]
    fn random_submissions_stay_consistent_with_replay() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let members = ["alice", "bob", "charlie", "dana", "erik"];
        let entries = ["dt2-1", "dt2-2", "dt2-3", "dt2-4", "dt2-5", "dt2-6"];
        let mut votes = EventVotes::default();

        for step in 0..500u64 {
            let member = members[rng.random_range(0..members.len())];
            match rng.random_range(0..3) {
                0 => {
                    let entry = entries[rng.random_range(0..entries.len())];
                    votes.apply_rating(member, entry, score(rng.random_range(1..=10)), at(step));
                }
                1 => {
                    let mut picked = BTreeMap::new();
                    for entry in entries {
                        if rng.random_bool(0.5) {
                            picked.insert(entry.to_string(), score(rng.random_range(1..=10)));
                        }
                    }
                    votes.apply_full_ballot(member, picked, None, at(step));
                }
                _ => {
                    let entry = entries[rng.random_range(0..entries.len())];
                    votes.apply_favorite(member, Some(entry.to_string()), at(step));
                }
            }

            for entry in entries {
                let aggregate = votes.aggregate(entry);
                let expected: Vec<u32> = votes
                    .ballots
                    .values()
                    .filter_map(|ballot| ballot.ratings.get(entry))
                    .map(|s| u32::from(s.get()))
                    .collect();
                assert_eq!(aggregate.count as usize, expected.len());
                assert_eq!(aggregate.sum, expected.iter().sum::<u32>());
                assert_eq!(
                    aggregate.avg,
                    average_one_decimal(aggregate.sum, aggregate.count)
                );
            }
            assert!(votes.voter_ids.len() <= members.len());
        }

        assert_matches_replay(&votes);
    }

    #[test]
    fn reveal_requires_every_current_member() {
        let members = member_ids(&["alice", "bob", "charlie"]);
        let voters = member_ids(&["alice", "bob"]);
        assert!(!is_revealed(&voters, &members, EventStatus::VotingOpen));

        let voters = member_ids(&["alice", "bob", "charlie"]);
        assert!(is_revealed(&voters, &members, EventStatus::VotingOpen));
    }

    #[test]
    fn former_members_do_not_count_towards_reveal() {
        let members = member_ids(&["alice", "bob"]);
        let voters = member_ids(&["alice", "zoe"]);
        assert_eq!(voted_member_count(&voters, &members), 1);
        assert!(!is_revealed(&voters, &members, EventStatus::VotingOpen));
    }

    #[test]
    fn closed_voting_reveals_without_full_participation() {
        let members = member_ids(&["alice", "bob"]);
        assert!(is_revealed(&[], &members, EventStatus::VotingClosed));
        assert!(is_revealed(&[], &members, EventStatus::Results));
        assert!(!is_revealed(&[], &[], EventStatus::VotingOpen));
    }
}
