//! Periodic re-resolution of the current event.

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{
    services::sse_events::broadcast_status_changed,
    state::{
        SharedState,
        catalog::EventId,
        schedule::{CurrentEvent, EventStatus, resolve},
    },
};

/// Remembers the last (event, status) pair seen by the ticker.
#[derive(Debug, Default)]
pub struct StatusTracker {
    last: Option<(EventId, EventStatus)>,
}

impl StatusTracker {
    /// Record `current`; `true` when it differs from the previous observation.
    pub fn observe(&mut self, current: &CurrentEvent) -> bool {
        let next = (current.event.id.clone(), current.status);
        if self.last.as_ref() == Some(&next) {
            return false;
        }
        self.last = Some(next);
        true
    }
}

/// Resolve once and broadcast when the result moved.
pub fn tick(state: &SharedState, tracker: &mut StatusTracker) {
    match resolve(state.catalog().events(), state.local_now()) {
        Ok(current) => {
            if tracker.observe(&current) {
                info!(
                    event_id = %current.event.id,
                    status = ?current.status,
                    "current event status changed"
                );
                broadcast_status_changed(state, &current);
            } else {
                debug!(event_id = %current.event.id, "current event status unchanged");
            }
        }
        Err(err) => warn!(error = %err, "failed to resolve the current event"),
    }
}

/// Run forever, resolving every `status_poll`.
pub async fn run(state: SharedState) {
    let mut ticker = interval(state.config().voting().status_poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut tracker = StatusTracker::default();

    loop {
        ticker.tick().await;
        tick(&state, &mut tracker);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use time::macros::datetime;

    use super::*;
    use crate::{
        config::AppConfig,
        services::sse_events::EVENT_STATUS_CHANGED,
        state::{AppState, clock::FixedClock},
    };

    #[tokio::test]
    async fn broadcasts_only_when_the_status_moves() {
        let clock = Arc::new(FixedClock::new(datetime!(2026-01-31 19:00 +1)));
        let state = AppState::new(AppConfig::builtin().unwrap(), clock.clone());
        let mut receiver = state.status_sse().subscribe();
        let mut tracker = StatusTracker::default();

        tick(&state, &mut tracker);
        let first = receiver.recv().await.unwrap();
        assert_eq!(first.event.as_deref(), Some(EVENT_STATUS_CHANGED));
        assert!(first.data.contains("today_countdown"));

        tick(&state, &mut tracker);
        assert!(receiver.try_recv().is_err());

        clock.set(datetime!(2026-01-31 20:05 +1));
        tick(&state, &mut tracker);
        let second = receiver.recv().await.unwrap();
        assert!(second.data.contains("voting_open"));
    }

    #[test]
    fn tracker_notices_a_new_event_with_the_same_status() {
        let config = AppConfig::builtin().unwrap();
        let events = config.catalog().events();
        let mut tracker = StatusTracker::default();

        let dt5 = CurrentEvent {
            event: events[4].clone(),
            status: EventStatus::VotingOpen,
        };
        let finalkval = CurrentEvent {
            event: events[5].clone(),
            status: EventStatus::VotingOpen,
        };

        assert!(tracker.observe(&dt5));
        assert!(!tracker.observe(&dt5));
        assert!(tracker.observe(&finalkval));
    }
}
