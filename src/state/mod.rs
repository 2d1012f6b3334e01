pub mod aggregate;
pub mod catalog;
pub mod clock;
pub mod party;
pub mod schedule;
mod sse;
pub mod stats;

use std::sync::Arc;

use time::PrimitiveDateTime;
use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::vote_store::VoteStore,
    error::ServiceError,
    state::{catalog::Catalog, clock::Clock},
};

pub use self::sse::{SseHub, SseState, VoteScope, VotesReceiver};

/// State handle shared by handlers and background tasks.
pub type SharedState = Arc<AppState>;

const STATUS_SSE_CAPACITY: usize = 16;

/// Central application state storing the catalog, stream hubs and the database handle.
pub struct AppState {
    vote_store: RwLock<Option<Arc<dyn VoteStore>>>,
    sse: SseState,
    degraded: watch::Sender<bool>,
    config: Arc<AppConfig>,
    clock: Arc<dyn Clock>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, clock: Arc<dyn Clock>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            vote_store: RwLock::new(None),
            sse: SseState::new(STATUS_SSE_CAPACITY),
            degraded: degraded_tx,
            config: Arc::new(config),
            clock,
        })
    }

    /// Obtain a handle to the current vote store, if one is installed.
    pub async fn vote_store(&self) -> Option<Arc<dyn VoteStore>> {
        let guard = self.vote_store.read().await;
        guard.as_ref().cloned()
    }

    /// Like [`vote_store`](Self::vote_store) but fails with [`ServiceError::Degraded`].
    pub async fn require_vote_store(&self) -> Result<Arc<dyn VoteStore>, ServiceError> {
        self.vote_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new vote store implementation and leave degraded mode.
    pub async fn set_vote_store(&self, store: Arc<dyn VoteStore>) {
        {
            let mut guard = self.vote_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current vote store and enter degraded mode.
    pub async fn clear_vote_store(&self) {
        {
            let mut guard = self.vote_store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    pub fn catalog(&self) -> &Catalog {
        self.config.catalog()
    }

    /// Wall-clock time in the catalog's time zone, the frame every schedule lookup uses.
    pub fn local_now(&self) -> PrimitiveDateTime {
        let local = self.clock.now().to_offset(self.config.utc_offset());
        PrimitiveDateTime::new(local.date(), local.time())
    }

    /// Current instant for ballot timestamps.
    pub fn now_system(&self) -> std::time::SystemTime {
        self.clock.now().into()
    }

    /// Broadcast hub used for the status SSE stream.
    pub fn status_sse(&self) -> &SseHub {
        self.sse.status()
    }

    /// Per-scope vote subscriptions.
    pub fn sse(&self) -> &SseState {
        &self.sse
    }
}

#[cfg(test)]
mod tests {
    use time::macros::{datetime, offset};

    use super::*;
    use crate::{
        config::VotingSettings, dao::vote_store::memory::InMemoryVoteStore, state::clock::FixedClock,
    };

    fn state_at(instant: time::OffsetDateTime) -> SharedState {
        let config = AppConfig::builtin().unwrap();
        let config = AppConfig::new(
            config.catalog().clone(),
            offset!(+1),
            VotingSettings::default(),
        );
        AppState::new(config, Arc::new(FixedClock::new(instant)))
    }

    #[tokio::test]
    async fn starts_degraded_until_a_store_is_installed() {
        let state = state_at(datetime!(2026-02-28 12:00 UTC));
        let mut watcher = state.degraded_watcher();
        assert!(state.is_degraded().await);
        assert!(matches!(
            state.require_vote_store().await,
            Err(ServiceError::Degraded)
        ));

        state.set_vote_store(Arc::new(InMemoryVoteStore::new())).await;
        assert!(!state.is_degraded().await);
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());

        state.update_degraded(false).await;
        assert!(!watcher.has_changed().unwrap());

        state.clear_vote_store().await;
        assert!(state.is_degraded().await);
    }

    #[test]
    fn local_time_follows_the_configured_offset() {
        let state = state_at(datetime!(2026-02-28 23:30 UTC));
        assert_eq!(state.local_now(), datetime!(2026-03-01 00:30));
    }
}
