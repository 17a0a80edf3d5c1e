use anyhow::{anyhow, Context};
use dotenv::dotenv;
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::Filter;

use stock_analysis_api::config::AppConfig;
use stock_analysis_api::routes;
use stock_analysis_api::services::agent::{FinanceAgent, StockAnalyst};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize the logger
    env_logger::init();
    info!("Logger initialized. Starting the application...");

    let config = AppConfig::from_env().context("invalid configuration")?;
    let addr = SocketAddr::new(config.host, config.port);
    info!("Will bind to: {}", addr);

    let agent = FinanceAgent::from_config(&config).map_err(|e| anyhow!("failed to build agent: {}", e))?;
    let analyst: Arc<dyn StockAnalyst> = Arc::new(agent);
    info!("Finance agent ready (model {})", config.openai_model);

    match &config.allowed_origins {
        Some(origins) => info!("CORS restricted to: {}", origins.join(", ")),
        None => info!("CORS allows any origin"),
    }

    let api = routes::routes(analyst, config.allowed_origins.as_deref()).with(warp::log("stock_analysis_api::http"));

    info!("Starting server on {}", addr);
    warp::serve(api).run(addr).await;

    Ok(())
}
