use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dto::{format_clock, format_date},
    state::{
        catalog::{Entry, Event, EventKind, VOTING_CLOSES_AT},
        schedule::{CurrentEvent, EventStatus},
    },
};

/// Kind of broadcast.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventKindDto {
    Semifinal,
    FinalPreQualifier,
    Final,
}

impl From<EventKind> for EventKindDto {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Semifinal => Self::Semifinal,
            EventKind::FinalPreQualifier => Self::FinalPreQualifier,
            EventKind::Final => Self::Final,
        }
    }
}

/// A scheduled event together with its status at request time.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EventSummary {
    pub id: String,
    pub kind: EventKindDto,
    /// Ordinal for semifinals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<u8>,
    pub name: String,
    /// Local calendar date, `YYYY-MM-DD`.
    pub date: String,
    /// Local start time, `HH:MM`.
    pub start_time: String,
    /// Local time voting closes on the event day, `HH:MM`.
    pub voting_closes_at: String,
    pub city: String,
    pub venue: String,
    pub status: EventStatus,
}

impl EventSummary {
    pub fn new(event: &Event, status: EventStatus) -> Self {
        Self {
            id: event.id.clone(),
            kind: event.kind.into(),
            number: event.number,
            name: event.name.clone(),
            date: format_date(event.date),
            start_time: format_clock(event.time),
            voting_closes_at: format_clock(VOTING_CLOSES_AT),
            city: event.city.clone(),
            venue: event.venue.clone(),
            status,
        }
    }
}

/// The event the app should focus on right now.
#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentEventResponse {
    pub event: EventSummary,
    pub status: EventStatus,
}

impl From<CurrentEvent> for CurrentEventResponse {
    fn from(current: CurrentEvent) -> Self {
        Self {
            event: EventSummary::new(&current.event, current.status),
            status: current.status,
        }
    }
}

/// A song of an event's line-up.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EntrySummary {
    pub id: String,
    pub event_id: String,
    pub start_number: u8,
    pub artist: String,
    pub song: String,
    pub songwriters: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

impl From<&Entry> for EntrySummary {
    fn from(entry: &Entry) -> Self {
        Self {
            id: entry.id.clone(),
            event_id: entry.event_id.clone(),
            start_number: entry.start_number,
            artist: entry.artist.clone(),
            song: entry.song.clone(),
            songwriters: entry.songwriters.clone(),
            bio: entry.bio.clone(),
        }
    }
}
