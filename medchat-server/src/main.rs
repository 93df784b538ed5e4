mod config;
mod error;
mod llm;
mod orchestrator;
mod prompts;
mod routes;

use std::sync::Arc;

use anyhow::Context;
use config::ServerConfig;
use orchestrator::{Orchestrator, TurnSettings};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("medchat_server=info,tower_http=info")),
        )
        .init();

    let config = ServerConfig::from_env().map_err(|e| {
        error!("Invalid configuration: {:#}", e);
        e
    })?;

    let client = llm::build_client(&config.provider).context("failed to create model client")?;
    info!(
        "Assessing risk for: {}",
        config.risk_conditions.join(", ")
    );

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::from(client),
        TurnSettings {
            conditions: config.risk_conditions.clone(),
            call_timeout: config.call_timeout,
            generation: config.generation.clone(),
        },
    ));

    let app = routes::build_router(orchestrator);

    info!("Server listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
