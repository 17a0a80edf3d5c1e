// src/bin/test_yahoo.rs
use dotenv::dotenv;
use log::{error, info};
use serde_json::json;
use stock_analysis_api::services::tools::MarketDataTool;
use stock_analysis_api::services::yahoo::{YahooFinanceTools, YahooFunction, YahooToolsConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::init();

    let symbol = std::env::args().nth(1).unwrap_or_else(|| "NVDA".to_string());
    info!("Testing Yahoo Finance tools for {}...", symbol);

    let tools = YahooFinanceTools::new(YahooToolsConfig::all())?;
    let mut failures = 0;

    for function in YahooFunction::ALL {
        match tools.call(function.name(), &json!({ "symbol": symbol })).await {
            Ok(output) => {
                info!("SUCCESS: {}", function.name());
                println!("{}:\n{}\n", function.name(), serde_json::to_string_pretty(&output)?);
            }
            Err(e) => {
                error!("ERROR: {} failed: {}", function.name(), e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(format!("{} of {} functions failed", failures, YahooFunction::ALL.len()).into());
    }

    Ok(())
}
