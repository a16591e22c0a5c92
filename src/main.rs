//! promptbench - prompt A/B testing API
//!
//! Compares how LLM backends respond to competing system prompts. Sessions
//! hold prompt variants and a shared transcript; the simulation endpoint
//! plays each selected variant against a simulated user for a bounded
//! number of turns.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod conversation;
mod core;
mod providers;
mod routes;
mod session;

use config::{Config, PromptSet};
use crate::core::BenchEngine;
use providers::Provider;
use session::SessionStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BenchEngine>,
    pub sessions: Arc<SessionStore>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "promptbench=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let seed = match config.prompts_path {
        Some(ref path) => {
            let set = PromptSet::load_from_file(path).await?;
            tracing::info!(
                "📝 Loaded {} prompt variant(s) from {}",
                set.variants.len(),
                path.display()
            );
            Some(set)
        }
        None => None,
    };

    let provider = Provider::from_name(&config.provider, &config)?;
    tracing::info!("🔌 Using {} provider", config.provider);

    let engine = Arc::new(BenchEngine::new(
        Arc::new(provider),
        Duration::from_secs(config.request_timeout_secs),
    ));

    let state = AppState {
        engine,
        sessions: Arc::new(SessionStore::new(seed)),
    };

    let app = Router::new()
        .merge(routes::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("🧪 promptbench API running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
