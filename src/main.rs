//! Mello Party Back binary entrypoint wiring REST, WebSocket, SSE and storage layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mello_party_back::{
    config::AppConfig,
    dao::vote_store::memory::InMemoryVoteStore,
    routes,
    services::{status_ticker, storage_supervisor},
    state::{AppState, SharedState, clock::SystemClock},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load().context("loading configuration")?;
    let app_state = AppState::new(config, Arc::new(SystemClock));

    start_storage(&app_state).await;
    tokio::spawn(status_ticker::run(app_state.clone()));

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Pick the storage backend from the environment and hand it to the supervisor.
///
/// `COUCH_BASE_URL` wins over `MONGO_URI`; without either, votes live in memory.
async fn start_storage(state: &SharedState) {
    #[cfg(feature = "couch-store")]
    {
        if env::var("COUCH_BASE_URL").is_ok() {
            use mello_party_back::dao::{
                storage::StorageError,
                vote_store::{
                    VoteStore,
                    couchdb::{CouchConfig, CouchVoteStore},
                },
            };

            match CouchConfig::from_env() {
                Ok(config) => {
                    info!(base_url = %config.base_url, database = %config.database, "using CouchDB storage");
                    tokio::spawn(storage_supervisor::run(state.clone(), move || {
                        let config = config.clone();
                        async move {
                            let store = CouchVoteStore::connect(config)
                                .await
                                .map_err(StorageError::from)?;
                            Ok::<Arc<dyn VoteStore>, StorageError>(Arc::new(store))
                        }
                    }));
                    return;
                }
                Err(err) => warn!(error = %err, "invalid CouchDB configuration"),
            }
        }
    }

    #[cfg(feature = "mongo-store")]
    {
        if env::var("MONGO_URI").is_ok() {
            use mello_party_back::dao::{
                storage::StorageError,
                vote_store::{
                    VoteStore,
                    mongodb::{MongoConfig, MongoVoteStore},
                },
            };

            info!("using MongoDB storage");
            tokio::spawn(storage_supervisor::run(state.clone(), || async {
                let config = MongoConfig::from_env().await.map_err(StorageError::from)?;
                let store = MongoVoteStore::connect(config)
                    .await
                    .map_err(StorageError::from)?;
                Ok::<Arc<dyn VoteStore>, StorageError>(Arc::new(store))
            }));
            return;
        }
    }

    warn!("no database configured; parties and votes are kept in memory only");
    state
        .set_vote_store(Arc::new(InMemoryVoteStore::new()))
        .await;
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
