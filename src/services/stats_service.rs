use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    dto::stats::{
        EntryAgreement, EventResultsResponse, FavoriteCount, LeaderboardResponse,
        PartyStatsResponse, RankedEntryView,
    },
    error::ServiceError,
    services::vote_service::{load_member_party, load_votes},
    state::{
        SharedState,
        aggregate::{EventVotes, is_revealed},
        schedule::status_of,
        stats::{agreement_index, favorite_distribution, leaderboard, rank_entries, ratings_for},
    },
};

/// Ranked results and favorite counts of a party for one event, once revealed.
pub async fn event_results(
    state: &SharedState,
    party_id: Uuid,
    event_id: &str,
    member_id: &str,
) -> Result<EventResultsResponse, ServiceError> {
    let catalog = state.catalog();
    let event = catalog
        .event(event_id)
        .ok_or_else(|| ServiceError::NotFound(format!("event `{event_id}` not found")))?;
    let store = state.require_vote_store().await?;
    let party = load_member_party(store.as_ref(), party_id, member_id).await?;
    let votes = load_votes(store.as_ref(), party_id, event_id).await?;

    let status = status_of(event, state.local_now());
    if !is_revealed(&votes.voter_ids, &party.members, status) {
        return Err(ServiceError::InvalidState(
            "results stay hidden until every member has voted or voting closes".into(),
        ));
    }

    let entries = catalog.entries(event_id);
    let rankings = rank_entries(entries, &votes.aggregates)
        .iter()
        .map(|ranked| RankedEntryView::new(catalog, ranked))
        .collect();
    let favorites = favorite_distribution(entries, votes.ballots.values())
        .into_iter()
        .map(|(entry_id, count)| FavoriteCount { entry_id, count })
        .collect();

    Ok(EventResultsResponse {
        party_id,
        event_id: event_id.to_owned(),
        rankings,
        favorites,
    })
}

/// Season ranking of every entry from events that are already over.
pub async fn party_leaderboard(
    state: &SharedState,
    party_id: Uuid,
    member_id: &str,
) -> Result<LeaderboardResponse, ServiceError> {
    let store = state.require_vote_store().await?;
    load_member_party(store.as_ref(), party_id, member_id).await?;
    let mut stored = stored_votes(state, party_id).await?;

    let catalog = state.catalog();
    let today = state.local_now().date();
    let mut event_ids = Vec::new();
    let mut rankings = Vec::new();
    for event in catalog.completed_events(today) {
        let votes = stored.remove(&event.id).unwrap_or_default();
        rankings.push(rank_entries(catalog.entries(&event.id), &votes.aggregates));
        event_ids.push(event.id.clone());
    }

    let entries = leaderboard(rankings)
        .iter()
        .map(|ranked| RankedEntryView::new(catalog, ranked))
        .collect();

    Ok(LeaderboardResponse {
        party_id,
        event_ids,
        entries,
    })
}

/// How unanimous the party was on each entry of its revealed events.
pub async fn party_stats(
    state: &SharedState,
    party_id: Uuid,
    member_id: &str,
) -> Result<PartyStatsResponse, ServiceError> {
    let store = state.require_vote_store().await?;
    let party = load_member_party(store.as_ref(), party_id, member_id).await?;
    let stored = stored_votes(state, party_id).await?;

    let catalog = state.catalog();
    let now = state.local_now();
    let mut entries = Vec::new();
    for event in catalog.events() {
        let Some(votes) = stored.get(&event.id) else {
            continue;
        };
        if !is_revealed(&votes.voter_ids, &party.members, status_of(event, now)) {
            continue;
        }
        for entry in catalog.entries(&event.id) {
            let ratings = ratings_for(votes.ballots.values(), &entry.id);
            if ratings.is_empty() {
                continue;
            }
            entries.push(EntryAgreement {
                event_id: event.id.clone(),
                entry_id: entry.id.clone(),
                ratings: ratings.len(),
                agreement: agreement_index(&ratings),
            });
        }
    }

    let contested: Vec<f64> = entries
        .iter()
        .filter(|entry| entry.ratings > 1)
        .map(|entry| entry.agreement)
        .collect();
    let overall_agreement = if contested.is_empty() {
        100.0
    } else {
        contested.iter().sum::<f64>() / contested.len() as f64
    };

    Ok(PartyStatsResponse {
        party_id,
        overall_agreement,
        entries,
    })
}

async fn stored_votes(
    state: &SharedState,
    party_id: Uuid,
) -> Result<HashMap<String, EventVotes>, ServiceError> {
    let store = state.require_vote_store().await?;
    let mut by_event = HashMap::new();
    for entity in store.list_event_votes(party_id).await? {
        let event_id = entity.event_id.clone();
        by_event.insert(event_id, entity.into_votes()?);
    }
    Ok(by_event)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use time::macros::datetime;

    use super::*;
    use crate::services::{test_support::Harness, vote_service};

    async fn rate(harness: &Harness, party_id: Uuid, member: &str, ratings: &[(&str, i64)]) {
        let ratings: BTreeMap<String, i64> = ratings
            .iter()
            .map(|(entry, score)| (entry.to_string(), *score))
            .collect();
        vote_service::submit_full_ballot(&harness.state, party_id, "dt1", member, ratings, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn results_are_ranked_once_revealed() {
        let harness = Harness::at(datetime!(2026-01-31 21:00 +1)).await;
        let party = harness.party_with(&["alice", "bob"]).await;
        rate(&harness, party.id, "alice", &[("dt1-1", 6), ("dt1-2", 9)]).await;

        let hidden = event_results(&harness.state, party.id, "dt1", "alice").await;
        assert!(matches!(hidden, Err(ServiceError::InvalidState(_))));

        rate(&harness, party.id, "bob", &[("dt1-1", 7), ("dt1-2", 9)]).await;
        vote_service::submit_favorite(&harness.state, party.id, "dt1", "bob", Some("dt1-1".into()))
            .await
            .unwrap();

        let results = event_results(&harness.state, party.id, "dt1", "alice")
            .await
            .unwrap();
        assert_eq!(results.rankings[0].entry_id, "dt1-2");
        assert_eq!(results.rankings[0].rank, 1);
        assert_eq!(results.rankings[0].artist, "Jacqline");
        assert_eq!(results.rankings[1].entry_id, "dt1-1");
        assert_eq!(results.rankings[1].avg, 6.5);
        assert_eq!(results.rankings.len(), 6);
        assert_eq!(results.favorites[0].entry_id, "dt1-1");
        assert_eq!(results.favorites[0].count, 1);
    }

    #[tokio::test]
    async fn leaderboard_only_covers_completed_events() {
        let harness = Harness::at(datetime!(2026-01-31 21:00 +1)).await;
        let party = harness.party_with(&["alice"]).await;
        rate(&harness, party.id, "alice", &[("dt1-3", 10)]).await;

        let today = party_leaderboard(&harness.state, party.id, "alice")
            .await
            .unwrap();
        assert!(today.event_ids.is_empty());
        assert!(today.entries.is_empty());

        harness.clock.set(datetime!(2026-02-08 12:00 +1));
        let later = party_leaderboard(&harness.state, party.id, "alice")
            .await
            .unwrap();
        assert_eq!(later.event_ids, vec!["dt1".to_string(), "dt2".to_string()]);
        assert_eq!(later.entries[0].entry_id, "dt1-3");
        assert_eq!(later.entries[0].avg, 10.0);
    }

    #[tokio::test]
    async fn agreement_reflects_spread_of_ratings() {
        let harness = Harness::at(datetime!(2026-01-31 21:00 +1)).await;
        let party = harness.party_with(&["alice", "bob"]).await;
        rate(&harness, party.id, "alice", &[("dt1-1", 5), ("dt1-2", 1)]).await;
        rate(&harness, party.id, "bob", &[("dt1-1", 5), ("dt1-2", 10)]).await;

        let stats = party_stats(&harness.state, party.id, "alice").await.unwrap();

        let agreement = |id: &str| {
            stats
                .entries
                .iter()
                .find(|entry| entry.entry_id == id)
                .map(|entry| entry.agreement)
                .unwrap()
        };
        assert_eq!(agreement("dt1-1"), 100.0);
        assert_eq!(agreement("dt1-2"), 0.0);
        assert_eq!(stats.overall_agreement, 50.0);
    }

    #[tokio::test]
    async fn unrevealed_events_are_left_out_of_stats() {
        let harness = Harness::at(datetime!(2026-01-31 21:00 +1)).await;
        let party = harness.party_with(&["alice", "bob"]).await;
        rate(&harness, party.id, "alice", &[("dt1-1", 5)]).await;

        let stats = party_stats(&harness.state, party.id, "alice").await.unwrap();

        assert!(stats.entries.is_empty());
        assert_eq!(stats.overall_agreement, 100.0);
    }
}
