mod config;
mod db;
mod embedding;
mod errors;
mod matching;
mod models;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::embedding::EmbeddingClient;
use crate::matching::feedback;
use crate::matching::service::Matcher;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Auto-Match API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    // Initialize embedding client
    let embedding = EmbeddingClient::new(config.embedding_service_url.clone());
    info!(
        "Embedding client initialized (service: {}, model: {})",
        config.embedding_service_url, config.embedding_model
    );

    // Initialize feedback backend (rule-based unless OPENAI_API_KEY is set)
    let feedback = feedback::select_backend(&config);
    info!(
        "Feedback backend initialized (llm: {})",
        config.openai_api_key.is_some()
    );

    // Build the matcher and app state
    let matcher = Arc::new(Matcher::new(db, embedding, config.clone(), feedback));
    let state = AppState { matcher };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
