//! LAN game list server: catalog listing, accounts, votes and admin tooling over HTTP.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_game_list::{
    config::{AppConfig, StoreBackend},
    dao::catalog_store::memory::MemoryCatalogStore,
    routes,
    services::{auth_service, query_service},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let port = config.port;
    let app_state = AppState::new(config);

    start_storage(&app_state).await;
    tokio::spawn(auth_service::run_session_sweeper(app_state.clone()));
    tokio::spawn(query_service::run_cache_pruner(app_state.clone()));

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Install the configured catalog store. MongoDB connects in the background so the
/// server starts in degraded mode when the database is not reachable yet.
async fn start_storage(state: &SharedState) {
    match state.config().store {
        StoreBackend::Memory => {
            warn!("using the in-memory store; data is lost on shutdown");
            state
                .set_catalog_store(Arc::new(MemoryCatalogStore::new()))
                .await;
        }
        #[cfg(feature = "mongo-store")]
        StoreBackend::Mongo => {
            use lan_game_list::{
                dao::{
                    catalog_store::{
                        CatalogStore,
                        mongodb::{MongoCatalogStore, MongoConfig},
                    },
                    storage::StorageError,
                },
                services::storage_supervisor,
            };

            let uri = state.config().mongo_uri.clone();
            let db_name = state.config().mongo_db.clone();
            tokio::spawn(storage_supervisor::run(state.clone(), move || {
                let uri = uri.clone();
                let db_name = db_name.clone();
                async move {
                    let config = MongoConfig::from_uri(&uri, Some(&db_name)).await?;
                    let store = MongoCatalogStore::connect(config).await?;
                    Ok::<_, StorageError>(Arc::new(store) as Arc<dyn CatalogStore>)
                }
            }));
        }
        #[cfg(not(feature = "mongo-store"))]
        StoreBackend::Mongo => {
            error!("built without the `mongo-store` feature; staying in degraded mode");
        }
    }
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
                error!(error = %err, "cannot install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
