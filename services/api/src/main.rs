mod config;
mod error;
mod routes;
mod upstream;

use crate::config::{Config, LlmProvider};
use crate::routes::{AppState, router};
use crate::upstream::UpstreamClient;
use anyhow::Context;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load API configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    for (name, present) in [
        ("GROKAI_API_KEY", config.grokai_api_key.is_some()),
        ("ELEVENLABS_API_KEY", config.elevenlabs_api_key.is_some()),
        (
            "OPENAI_API_KEY",
            config.llm_provider != LlmProvider::OpenAi || config.openai_api_key.is_some(),
        ),
    ] {
        if !present {
            tracing::warn!("{} is not set; routes needing it will return a configuration error.", name);
        }
    }
    info!("Chat provider: {:?}", config.llm_provider);

    // Configure a permissive CORS policy so a browser frontend on another
    // origin can call the API.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let addr = config.bind_address;
    let app = router(AppState {
        config: Arc::new(config),
        upstream: UpstreamClient::new(),
    })
    .layer(cors);

    info!("Starting sightline API, listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
