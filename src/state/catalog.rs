//! Immutable contest schedule: events and the entries performing in them.

use std::collections::{HashMap, HashSet};

use time::{Date, PrimitiveDateTime, Time, macros::time};

use crate::config::ConfigError;

/// Identifier of a contest event (`dt1`, `finalkval`, ...).
pub type EventId = String;
/// Identifier of an entry, unique within its event (`dt1-3`).
pub type EntryId = String;
/// Opaque member identifier handed over by the identity provider.
pub type MemberId = String;

/// Local time at which voting closes on the day of an event.
pub const VOTING_CLOSES_AT: Time = time!(23:59);
/// Maximum number of events that may share a calendar date.
const MAX_EVENTS_PER_DATE: usize = 2;

/// Kind of broadcast an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Semifinal,
    FinalPreQualifier,
    Final,
}

/// A scheduled broadcast. Dates and times are expressed in the contest's local time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    pub kind: EventKind,
    /// Ordinal of the semifinal; `None` for the other kinds.
    pub number: Option<u8>,
    pub name: String,
    pub date: Date,
    pub time: Time,
    pub city: String,
    pub venue: String,
}

impl Event {
    /// Local instant the show starts and voting opens.
    pub fn show_start(&self) -> PrimitiveDateTime {
        PrimitiveDateTime::new(self.date, self.time)
    }

    /// Local instant voting closes.
    pub fn voting_end(&self) -> PrimitiveDateTime {
        PrimitiveDateTime::new(self.date, VOTING_CLOSES_AT)
    }
}

/// A song performing in an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: EntryId,
    pub event_id: EventId,
    pub start_number: u8,
    pub artist: String,
    pub song: String,
    pub songwriters: Vec<String>,
    pub bio: Option<String>,
}

/// Validated, ordered view over every event and entry of the season.
#[derive(Debug, Clone)]
pub struct Catalog {
    events: Vec<Event>,
    entries: HashMap<EventId, Vec<Entry>>,
}

impl Catalog {
    /// Build a catalog, checking the structural rules the resolver and the vote engine rely on.
    pub fn new(mut events: Vec<Event>, entries: Vec<Entry>) -> Result<Self, ConfigError> {
        if events.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }

        let mut seen = HashSet::new();
        let mut per_date: HashMap<Date, usize> = HashMap::new();
        for event in &events {
            if !seen.insert(event.id.as_str()) {
                return Err(ConfigError::DuplicateEvent {
                    event_id: event.id.clone(),
                });
            }
            if event.kind == EventKind::Semifinal && event.number.is_none() {
                return Err(ConfigError::MissingSemifinalNumber {
                    event_id: event.id.clone(),
                });
            }
            let count = per_date.entry(event.date).or_default();
            *count += 1;
            if *count > MAX_EVENTS_PER_DATE {
                return Err(ConfigError::CrowdedDate { date: event.date });
            }
        }

        let mut grouped: HashMap<EventId, Vec<Entry>> = HashMap::new();
        for entry in entries {
            if !seen.contains(entry.event_id.as_str()) {
                return Err(ConfigError::UnknownEvent {
                    entry_id: entry.id,
                    event_id: entry.event_id,
                });
            }
            let bucket = grouped.entry(entry.event_id.clone()).or_default();
            if bucket.iter().any(|existing| existing.id == entry.id) {
                return Err(ConfigError::DuplicateEntry {
                    event_id: entry.event_id,
                    entry_id: entry.id,
                });
            }
            bucket.push(entry);
        }
        for bucket in grouped.values_mut() {
            bucket.sort_by_key(|entry| entry.start_number);
        }

        events.sort_by_key(|event| (event.date, event.time));

        Ok(Self {
            events,
            entries: grouped,
        })
    }

    /// Every event ordered by (date, time).
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn event(&self, event_id: &str) -> Option<&Event> {
        self.events.iter().find(|event| event.id == event_id)
    }

    /// Entries of an event ordered by start number. Unknown events have no entries.
    pub fn entries(&self, event_id: &str) -> &[Entry] {
        self.entries
            .get(event_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn entry(&self, event_id: &str, entry_id: &str) -> Option<&Entry> {
        self.entries(event_id)
            .iter()
            .find(|entry| entry.id == entry_id)
    }

    /// Events whose calendar date lies strictly before `today`.
    pub fn completed_events(&self, today: Date) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |event| event.date < today)
    }
}
