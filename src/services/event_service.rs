use crate::{
    dto::events::{CurrentEventResponse, EntrySummary, EventSummary},
    error::ServiceError,
    state::{
        SharedState,
        schedule::{CurrentEvent, resolve, status_of},
    },
};

/// Every event of the season with its status right now.
pub fn list_events(state: &SharedState) -> Vec<EventSummary> {
    let now = state.local_now();
    state
        .catalog()
        .events()
        .iter()
        .map(|event| EventSummary::new(event, status_of(event, now)))
        .collect()
}

/// The event the app should focus on, as picked by the schedule resolver.
pub fn current_event(state: &SharedState) -> Result<CurrentEvent, ServiceError> {
    resolve(state.catalog().events(), state.local_now())
        .map_err(|err| ServiceError::Misconfigured(err.to_string()))
}

pub fn current_event_summary(state: &SharedState) -> Result<CurrentEventResponse, ServiceError> {
    current_event(state).map(CurrentEventResponse::from)
}

/// Line-up of an event in start order.
pub fn list_entries(state: &SharedState, event_id: &str) -> Result<Vec<EntrySummary>, ServiceError> {
    let catalog = state.catalog();
    if catalog.event(event_id).is_none() {
        return Err(ServiceError::NotFound(format!("event `{event_id}` not found")));
    }
    Ok(catalog
        .entries(event_id)
        .iter()
        .map(EntrySummary::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::{services::test_support::Harness, state::schedule::EventStatus};

    #[tokio::test]
    async fn finalkval_takes_over_once_it_starts() {
        let harness = Harness::at(datetime!(2026-02-28 21:00 +1)).await;
        let current = current_event(&harness.state).unwrap();
        assert_eq!(current.event.id, "dt5");
        assert_eq!(current.status, EventStatus::VotingOpen);

        harness.clock.set(datetime!(2026-02-28 22:00 +1));
        let current = current_event(&harness.state).unwrap();
        assert_eq!(current.event.id, "finalkval");
        assert_eq!(current.status, EventStatus::VotingOpen);
    }

    #[tokio::test]
    async fn events_carry_their_own_status() {
        let harness = Harness::at(datetime!(2026-02-07 20:30 +1)).await;
        let events = list_events(&harness.state);

        let status = |id: &str| {
            events
                .iter()
                .find(|event| event.id == id)
                .map(|event| event.status)
                .unwrap()
        };
        assert_eq!(status("dt1"), EventStatus::Results);
        assert_eq!(status("dt2"), EventStatus::VotingOpen);
        assert_eq!(status("final"), EventStatus::Upcoming);
        assert_eq!(events[1].start_time, "20:00");
        assert_eq!(events[1].date, "2026-02-07");
    }

    #[tokio::test]
    async fn entries_follow_the_running_order() {
        let harness = Harness::at(datetime!(2026-01-20 12:00 +1)).await;

        let entries = list_entries(&harness.state, "dt1").unwrap();
        let numbers: Vec<u8> = entries.iter().map(|entry| entry.start_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);

        assert!(matches!(
            list_entries(&harness.state, "dt9"),
            Err(ServiceError::NotFound(_))
        ));
    }
}
