// src/bin/analyze_stock.rs
//
// Runs a single agent query and prints the structured result as JSON.
use anyhow::{anyhow, Context};
use clap::Parser;
use dotenv::dotenv;
use log::info;

use stock_analysis_api::config::AppConfig;
use stock_analysis_api::services::agent::{analysis_prompt, FinanceAgent};

const DEFAULT_PROMPT: &str = "Share the NVDA stock price and analyst recommendations";

#[derive(Debug, Parser)]
#[command(about = "Ask the finance agent for a structured stock analysis")]
struct Args {
    /// Ticker to analyze with the standard analysis prompt
    symbol: Option<String>,

    /// Free-form prompt; overrides SYMBOL
    #[arg(long)]
    prompt: Option<String>,

    /// Print compact JSON instead of pretty-printed
    #[arg(long)]
    compact: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let prompt = match (&args.prompt, &args.symbol) {
        (Some(prompt), _) => prompt.clone(),
        (None, Some(symbol)) => analysis_prompt(&symbol.trim().to_uppercase()),
        (None, None) => DEFAULT_PROMPT.to_string(),
    };

    let config = AppConfig::from_env().context("invalid configuration")?;
    let agent = FinanceAgent::from_config(&config).map_err(|e| anyhow!("failed to build agent: {}", e))?;

    info!("Running agent: {}", prompt);
    let run = agent.run(&prompt).await.context("agent run failed")?;
    info!("Agent made {} tool call(s)", run.tool_calls.len());

    let output = if args.compact {
        serde_json::to_string(&run.content)?
    } else {
        serde_json::to_string_pretty(&run.content)?
    };
    println!("{}", output);

    Ok(())
}
