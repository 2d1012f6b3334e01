use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::{catalog::Catalog, stats::RankedEntry};

/// A ranked entry with its line-up details.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RankedEntryView {
    pub rank: usize,
    pub event_id: String,
    pub entry_id: String,
    pub artist: String,
    pub song: String,
    pub sum: u32,
    pub count: u32,
    pub avg: f64,
}

impl RankedEntryView {
    pub fn new(catalog: &Catalog, ranked: &RankedEntry) -> Self {
        let (artist, song) = catalog
            .entry(&ranked.event_id, &ranked.entry_id)
            .map(|entry| (entry.artist.clone(), entry.song.clone()))
            .unwrap_or_default();
        Self {
            rank: ranked.rank,
            event_id: ranked.event_id.clone(),
            entry_id: ranked.entry_id.clone(),
            artist,
            song,
            sum: ranked.aggregate.sum,
            count: ranked.aggregate.count,
            avg: ranked.aggregate.avg,
        }
    }
}

/// Number of members naming an entry as their favorite.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FavoriteCount {
    pub entry_id: String,
    pub count: u32,
}

/// Revealed results of a party for one event.
#[derive(Debug, Serialize, ToSchema)]
pub struct EventResultsResponse {
    pub party_id: Uuid,
    pub event_id: String,
    pub rankings: Vec<RankedEntryView>,
    /// In line-up order.
    pub favorites: Vec<FavoriteCount>,
}

/// Season ranking across every completed event.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardResponse {
    pub party_id: Uuid,
    /// Events that contributed, in schedule order.
    pub event_ids: Vec<String>,
    pub entries: Vec<RankedEntryView>,
}

/// How much a party agreed on one entry.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EntryAgreement {
    pub event_id: String,
    pub entry_id: String,
    pub ratings: usize,
    /// 0 (split) to 100 (unanimous).
    pub agreement: f64,
}

/// Agreement figures over a party's revealed events.
#[derive(Debug, Serialize, ToSchema)]
pub struct PartyStatsResponse {
    pub party_id: Uuid,
    /// Mean agreement over every entry with at least two ratings; 100 when none has.
    pub overall_agreement: f64,
    pub entries: Vec<EntryAgreement>,
}
