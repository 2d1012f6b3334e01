//! Rankings and agreement figures computed from revealed party votes.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::state::{
    aggregate::{Ballot, VoteAggregate},
    catalog::{Entry, EntryId, EventId},
};

/// Standard deviation (in rating points) at which agreement drops to zero.
const MAX_DEVIATION: f64 = 4.5;

/// An entry's position within a party ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntry {
    pub rank: usize,
    pub event_id: EventId,
    pub entry_id: EntryId,
    pub aggregate: VoteAggregate,
}

/// Rank the entries of an event by average, then by vote count.
///
/// Entries nobody rated are included with zero totals so the list always covers the
/// whole line-up.
pub fn rank_entries(
    entries: &[Entry],
    aggregates: &BTreeMap<EntryId, VoteAggregate>,
) -> Vec<RankedEntry> {
    let rows = entries
        .iter()
        .map(|entry| RankedEntry {
            rank: 0,
            event_id: entry.event_id.clone(),
            entry_id: entry.id.clone(),
            aggregate: aggregates.get(&entry.id).copied().unwrap_or_default(),
        })
        .collect();
    rerank(rows)
}

/// Merge per-event rankings into one season leaderboard.
pub fn leaderboard(rankings: impl IntoIterator<Item = Vec<RankedEntry>>) -> Vec<RankedEntry> {
    rerank(rankings.into_iter().flatten().collect())
}

fn rerank(mut rows: Vec<RankedEntry>) -> Vec<RankedEntry> {
    rows.sort_by(|a, b| {
        b.aggregate
            .avg
            .total_cmp(&a.aggregate.avg)
            .then_with(|| b.aggregate.count.cmp(&a.aggregate.count))
    });
    for (position, row) in rows.iter_mut().enumerate() {
        row.rank = position + 1;
    }
    rows
}

/// Population standard deviation.
pub fn standard_deviation(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// How closely the party agrees on a set of ratings, from 0 to 100.
///
/// Zero or one rating counts as full agreement.
pub fn agreement_index(ratings: &[u8]) -> f64 {
    if ratings.len() <= 1 {
        return 100.0;
    }
    let values: Vec<f64> = ratings.iter().copied().map(f64::from).collect();
    let deviation = standard_deviation(&values);
    (100.0 - deviation / MAX_DEVIATION * 100.0).clamp(0.0, 100.0)
}

/// Every rating given to an entry across the ballots.
pub fn ratings_for<'a>(ballots: impl IntoIterator<Item = &'a Ballot>, entry_id: &str) -> Vec<u8> {
    ballots
        .into_iter()
        .filter_map(|ballot| ballot.ratings.get(entry_id))
        .map(|score| score.get())
        .collect()
}

/// How many ballots name each entry as favorite, in line-up order.
pub fn favorite_distribution<'a>(
    entries: &[Entry],
    ballots: impl IntoIterator<Item = &'a Ballot>,
) -> IndexMap<EntryId, u32> {
    let mut distribution: IndexMap<EntryId, u32> =
        entries.iter().map(|entry| (entry.id.clone(), 0)).collect();
    for ballot in ballots {
        if let Some(count) = ballot
            .favorite
            .as_ref()
            .and_then(|favorite| distribution.get_mut(favorite))
        {
            *count += 1;
        }
    }
    distribution
}
