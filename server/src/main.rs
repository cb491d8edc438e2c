mod config;
mod error;
mod gateway;
mod openai;
mod prompt;
mod routes;
mod search;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::EnvOverrides;
use gateway::Gateway;
use openai::{CompletionProvider, OAIClient};
use search::{SearchProvider, TavilyClient};

const CONFIG_ENV: &str = "ESG_CHAT_CONFIG";
const CONFIG_FILE: &str = "chat.json";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "esg_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| CONFIG_FILE.to_string());
    let config = Arc::new(config::load_config(&config_path, EnvOverrides::from_env()).await?);

    if !config.has_completion_key() {
        tracing::warn!("No completion provider key configured; /chat will answer 500");
    }

    let completion: Arc<dyn CompletionProvider> = Arc::new(OAIClient::new(
        &config.completion,
        config.completion.api_key.as_deref().unwrap_or_default(),
    ));
    let search: Option<Arc<dyn SearchProvider>> = config.search.api_key.as_deref().map(|key| {
        Arc::new(TavilyClient::new(&config.search, key)) as Arc<dyn SearchProvider>
    });

    let gateway = Gateway::new(config.clone(), completion, search);
    let app = routes::router(Arc::new(gateway));

    for candidate in &config.completion.models {
        tracing::info!("model #{}: {}", candidate.priority, candidate.id);
    }
    tracing::info!("listening on {}", config.listen);

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
