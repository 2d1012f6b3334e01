//! Pure resolution of the "current" event and its lifecycle status.

use serde::Serialize;
use time::PrimitiveDateTime;
use utoipa::ToSchema;

use crate::{config::ConfigError, state::catalog::Event};

/// Lifecycle of a single event:
/// `Upcoming -> TodayCountdown -> VotingOpen -> VotingClosed -> Results`.
/// `SeasonComplete` is only reached once no future event remains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// The event is on a later day.
    Upcoming,
    /// The event is today and the show has not started yet.
    TodayCountdown,
    /// The show is running; ballots may be changed.
    VotingOpen,
    /// Voting ended for the night.
    VotingClosed,
    /// The event is over and its results are final.
    Results,
    /// The last event of the season is over.
    SeasonComplete,
}

impl EventStatus {
    /// Whether ballots for an event in this status may still be changed.
    pub fn accepts_votes(self) -> bool {
        matches!(self, Self::TodayCountdown | Self::VotingOpen)
    }

    /// Whether party results are revealed regardless of voting progress.
    pub fn reveals_results(self) -> bool {
        matches!(
            self,
            Self::VotingClosed | Self::Results | Self::SeasonComplete
        )
    }
}

/// The event the application should focus on right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentEvent {
    pub event: Event,
    pub status: EventStatus,
}

impl CurrentEvent {
    fn new(event: &Event, status: EventStatus) -> Self {
        Self {
            event: event.clone(),
            status,
        }
    }
}

/// Pick the current event for the local instant `now`.
///
/// On a show day the latest event whose voting window is open wins, so an earlier
/// show keeps the focus until a later one on the same evening actually starts.
/// Without an open window the next show of the day counts down, and once every
/// window of the day has closed the day's last event shows results.
pub fn resolve(events: &[Event], now: PrimitiveDateTime) -> Result<CurrentEvent, ConfigError> {
    let mut sorted: Vec<&Event> = events.iter().collect();
    sorted.sort_by_key(|event| (event.date, event.time));

    let today = now.date();
    let todays: Vec<&Event> = sorted
        .iter()
        .copied()
        .filter(|event| event.date == today)
        .collect();

    if let Some(last_today) = todays.last() {
        let open = todays
            .iter()
            .rev()
            .find(|event| now >= event.show_start() && now < event.voting_end());
        if let Some(event) = open {
            return Ok(CurrentEvent::new(event, EventStatus::VotingOpen));
        }

        if let Some(event) = todays.iter().find(|event| now < event.show_start()) {
            return Ok(CurrentEvent::new(event, EventStatus::TodayCountdown));
        }

        return Ok(CurrentEvent::new(last_today, EventStatus::Results));
    }

    let most_recent_past = sorted.iter().rev().find(|event| event.date < today);
    let has_future = sorted.iter().any(|event| event.date > today);

    match (most_recent_past, has_future) {
        (Some(past), true) => Ok(CurrentEvent::new(past, EventStatus::Results)),
        (Some(past), false) => Ok(CurrentEvent::new(past, EventStatus::SeasonComplete)),
        (None, true) => {
            let nearest = sorted.iter().find(|event| event.date > today);
            nearest
                .map(|event| CurrentEvent::new(event, EventStatus::Upcoming))
                .ok_or(ConfigError::EmptyCatalog)
        }
        (None, false) => Err(ConfigError::EmptyCatalog),
    }
}

/// Lifecycle status of one specific event at the local instant `now`.
pub fn status_of(event: &Event, now: PrimitiveDateTime) -> EventStatus {
    let today = now.date();
    if event.date > today {
        EventStatus::Upcoming
    } else if event.date < today {
        EventStatus::Results
    } else if now < event.show_start() {
        EventStatus::TodayCountdown
    } else if now < event.voting_end() {
        EventStatus::VotingOpen
    } else {
        EventStatus::VotingClosed
    }
}
