//! Return Desk - conversational returns backend
//!
//! Widget clicks and agent tool calls drive one versioned session record
//! per conversation through the returns workflow.

mod api;
mod config;
mod db;
mod engine;
mod flow;
mod returns;
mod session;
mod summary;
mod tools;
mod widgets;

use api::{create_router, AppState};
use config::{AppConfig, SessionBackend};
use db::Database;
use engine::ReturnsEngine;
use returns::policy::ReturnPolicy;
use returns::DatabaseReturnService;
use session::{DatabaseSessionStore, MemorySessionStore, SessionStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "return_desk=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env();

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    let store: Arc<dyn SessionStore> = match config.session_backend {
        SessionBackend::Memory => Arc::new(MemorySessionStore::new()),
        SessionBackend::Sqlite => Arc::new(DatabaseSessionStore::new(db.clone())),
    };
    tracing::info!(
        backend = ?config.session_backend,
        return_window_days = config.return_window_days,
        "Session store ready"
    );

    let policy = ReturnPolicy::new(config.return_window_days);
    let returns = DatabaseReturnService::new(db.clone(), policy);
    let engine = ReturnsEngine::new(store, returns).with_policy(policy);
    let state = AppState::new(engine, db);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Return Desk listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
