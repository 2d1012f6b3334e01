use std::sync::Arc;

use time::OffsetDateTime;

use crate::{
    config::AppConfig,
    dao::vote_store::memory::InMemoryVoteStore,
    services::party_service,
    state::{
        AppState, SharedState,
        clock::FixedClock,
        party::{Member, Party},
    },
};

/// Application state over the built-in season, an in-memory store and a pinned clock.
pub struct Harness {
    pub state: SharedState,
    pub store: InMemoryVoteStore,
    pub clock: FixedClock,
}

impl Harness {
    pub async fn at(instant: OffsetDateTime) -> Self {
        let config = AppConfig::builtin().expect("built-in configuration is valid");
        let clock = FixedClock::new(instant);
        let state = AppState::new(config, Arc::new(clock.clone()));
        let store = InMemoryVoteStore::new();
        state.set_vote_store(Arc::new(store.clone())).await;
        Self {
            state,
            store,
            clock,
        }
    }

    /// A party created by the first id and joined by the others, in order.
    pub async fn party_with(&self, member_ids: &[&str]) -> Party {
        let (creator, others) = member_ids.split_first().expect("at least one member");
        let mut party = party_service::create_party(&self.state, &member(creator), "Soffan")
            .await
            .expect("party creation succeeds");
        for id in others {
            party = party_service::join_party(&self.state, &member(id), &party.join_code)
                .await
                .expect("join succeeds");
        }
        party
    }
}

pub fn member(id: &str) -> Member {
    Member {
        id: id.to_owned(),
        name: format!("Member {id}"),
        photo: None,
    }
}
