use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prizedraw::{
    api, auth,
    config::AppConfig,
    llm,
    state::{AppState, SnapshotStore},
    store::{LedgerStore, MemoryLedgerStore, StoreConfig},
    sync, ws,
};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prizedraw=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting prize draw server...");

    let config = AppConfig::from_env();
    let auth_config = Arc::new(auth::AuthConfig::from_env());

    let store: Arc<dyn LedgerStore> = match StoreConfig::from_env().build_store() {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to set up ledger store: {}. Keeping winners in memory.", e);
            Arc::new(MemoryLedgerStore::new())
        }
    };

    let column_mapper = match llm::LlmConfig::from_env().build_manager() {
        Ok(manager) => {
            tracing::info!("LLM column mapping enabled");
            Some(manager)
        }
        Err(e) => {
            tracing::warn!("{}. Participant columns will be matched by header name.", e);
            None
        }
    };

    let state = Arc::new(AppState::with_services(
        config.draw.clone(),
        store,
        Some(SnapshotStore::new(&config.snapshot_path)),
        column_mapper,
    ));
    state.restore_snapshot().await;

    let sync_handle = sync::start(state.clone()).await;

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/host", get(auth::serve_host))
        .route("/host.html", get(auth::serve_host))
        .route("/api/winners/export", get(api::export_winners))
        .route("/api/winners/export.csv", get(api::export_winners_csv))
        .route("/api/state/export", get(api::export_state))
        .route("/api/state/import", post(api::import_state))
        .fallback_service(ServeDir::new("static"))
        .layer(middleware::from_fn_with_state(
            auth_config.clone(),
            auth::host_auth_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("Listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind listen address");
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {}", e);
    }

    sync_handle.shutdown().await;
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
