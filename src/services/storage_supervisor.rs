use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{storage::StorageError, vote_store::VoteStore},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect to the storage backend, install it, and watch its health.
///
/// While the backend is unreachable the shared state stays in degraded mode: reads and
/// writes answer `503` and the SSE streams report it.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn VoteStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.set_vote_store(store.clone()).await;
                info!("storage connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                loop {
                    match store.health_check().await {
                        Ok(()) => {
                            if state.is_degraded().await {
                                info!("storage healthy again; leaving degraded mode");
                                state.update_degraded(false).await;
                            }
                            sleep(HEALTH_POLL_INTERVAL).await;
                        }
                        Err(_) => {
                            let mut attempt = 0;
                            let mut reconnect_delay = INITIAL_DELAY;
                            let mut reconnected = false;

                            while attempt < MAX_RECONNECT_ATTEMPTS {
                                match store.try_reconnect().await {
                                    Ok(()) => {
                                        info!(
                                            "storage reconnection succeeded after health check failure"
                                        );
                                        reconnected = true;
                                        break;
                                    }
                                    Err(reconnect_err) => {
                                        if attempt == 0 {
                                            warn!(
                                                attempt, error = %reconnect_err,
                                                "storage reconnect first attempt failed; entering in degraded mode"
                                            );
                                            state.update_degraded(true).await;
                                        } else {
                                            warn!(attempt, error = %reconnect_err, "storage reconnect attempt failed");
                                        };
                                        attempt += 1;
                                        sleep(reconnect_delay).await;
                                        reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
                                    }
                                }
                            }

                            if reconnected {
                                state.update_degraded(false).await;
                                sleep(HEALTH_POLL_INTERVAL).await;
                                continue;
                            } else {
                                warn!(
                                    "exhausted storage reconnect attempts; dropping the store and connecting again"
                                );
                                state.clear_vote_store().await;
                                break;
                            }
                        }
                    }
                }

                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::vote_store::memory::InMemoryVoteStore,
        state::{AppState, clock::FixedClock},
    };

    #[tokio::test(start_paused = true)]
    async fn toggles_degraded_mode_with_store_health() {
        let state = AppState::new(
            AppConfig::builtin().unwrap(),
            Arc::new(FixedClock::new(datetime!(2026-01-31 12:00 +1))),
        );
        let store = InMemoryVoteStore::new();
        let supervised = store.clone();
        let supervisor = tokio::spawn(run(state.clone(), move || {
            let store = supervised.clone();
            async move { Ok::<Arc<dyn VoteStore>, StorageError>(Arc::new(store)) }
        }));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!state.is_degraded().await);
        assert!(state.vote_store().await.is_some());

        store.set_offline(true);
        tokio::time::sleep(HEALTH_POLL_INTERVAL + Duration::from_millis(10)).await;
        assert!(state.is_degraded().await);

        store.set_offline(false);
        tokio::time::sleep(INITIAL_DELAY * 4).await;
        assert!(!state.is_degraded().await);

        supervisor.abort();
    }
}
