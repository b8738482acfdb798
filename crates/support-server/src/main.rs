//! Order support HTTP server
//!
//! Axum-based server exposing a synchronous JSON endpoint and three
//! Server-Sent Events endpoints over the order support agent.

mod config;
mod handlers;
mod sse;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::LlmProvider;
use agent_runtime::OpenAiProvider;
use order_support::{MemoryOrderStore, OrderStore};

use crate::config::ServerConfig;
use crate::handlers::{
    health_check, support_handler, support_stream_final_handler, support_stream_handler,
    support_stream_structured_handler,
};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;

    // Initialize LLM provider
    let provider = Arc::new(OpenAiProvider::from_config(config.openai.clone()));
    match provider.health_check().await {
        Ok(true) => tracing::info!("✓ Connected to {} at {}", provider.name(), config.openai.base_url),
        Ok(false) | Err(_) => {
            tracing::warn!("⚠ {} not reachable - requests will fail", provider.name());
            tracing::warn!("  Check OPENAI_API_KEY and OPENAI_BASE_URL");
        }
    }

    // Order lookup tools
    let store: Arc<dyn OrderStore> = Arc::new(MemoryOrderStore::seeded());
    let tools = order_support::registry(Arc::clone(&store));

    tracing::info!("Registered {} tools over {}:", tools.len(), store.name());
    for name in tools.names() {
        tracing::info!("  • {}", name);
    }

    let state = AppState::new(provider, Arc::new(tools), &config);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("order support API listening on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("  model: {} (max {} tool steps)", config.model, config.max_steps);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                     - Health check");
    tracing::info!("  POST /support                    - JSON answer{}", if config.structured { " (structured)" } else { "" });
    tracing::info!("  GET  /support-stream             - SSE answer, no tools");
    tracing::info!("  GET  /support-stream-final       - SSE answer after tool resolution");
    tracing::info!("  GET  /support-stream-structured  - SSE turns + SupportResponse");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application router
fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/support", post(support_handler))
        .route("/support-stream", get(support_stream_handler))
        .route("/support-stream-final", get(support_stream_final_handler))
        .route("/support-stream-structured", get(support_stream_structured_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
