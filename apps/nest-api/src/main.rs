use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use nest_api::config::Config;
use nest_api::db::store::{MemoryStore, MessageStore};
use nest_api::routes::ApiDoc;
use nest_api::AppState;

/// How often offline presences are swept.
const PRESENCE_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[tokio::main]
async fn main() {
    // Load .env if present; variables may also come from the environment.
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;
    tracing::info!(
        nearby_radius_meters = config.nearby_radius_meters,
        outbox_capacity = config.outbox_capacity,
        proximity_cell_degrees = config.proximity_cell_degrees,
        "nest-api configured"
    );

    // In-memory message store. Swap for a database-backed MessageStore when one exists.
    let store: Arc<dyn MessageStore> = Arc::new(MemoryStore::new());
    let state = AppState::new(config, store);

    spawn_presence_sweep(state.clone());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(nest_api::routes::router())
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "nest-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

/// Periodically drop offline presences older than the retention window.
fn spawn_presence_sweep(state: AppState) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PRESENCE_SWEEP_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = state
                .hub
                .presence()
                .prune_offline(state.config.presence_retention);
            if removed > 0 {
                tracing::info!(removed, "pruned offline presences");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
