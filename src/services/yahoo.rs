// src/services/yahoo.rs
//
// Yahoo Finance market-data functions exposed to the agent as tools.
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Utc};
use log::{debug, info, warn};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::error::ToolError;
use super::tools::{optional_str, required_str, schema, MarketDataTool, ToolDefinition};

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const COOKIE_URL: &str = "https://fc.yahoo.com";
const CRUMB_URLS: [&str; 2] = [
    "https://query1.finance.yahoo.com/v1/test/getcrumb",
    "https://query2.finance.yahoo.com/v1/test/getcrumb",
];
const REFERER: &str = "https://finance.yahoo.com/";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

pub const VALID_PERIODS: [&str; 11] = ["1d", "5d", "1mo", "3mo", "6mo", "1y", "2y", "5y", "10y", "ytd", "max"];
pub const VALID_INTERVALS: [&str; 13] = [
    "1m", "2m", "5m", "15m", "30m", "60m", "90m", "1h", "1d", "5d", "1wk", "1mo", "3mo",
];

/// How far back analyst rating changes are reported.
const RECOMMENDATION_WINDOW_DAYS: i64 = 90;
const MAX_RECOMMENDATIONS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YahooFunction {
    CurrentPrice,
    CompanyInfo,
    HistoricalPrices,
    Fundamentals,
    IncomeStatements,
    KeyRatios,
    AnalystRecommendations,
}

impl YahooFunction {
    pub const ALL: [YahooFunction; 7] = [
        YahooFunction::CurrentPrice,
        YahooFunction::CompanyInfo,
        YahooFunction::HistoricalPrices,
        YahooFunction::Fundamentals,
        YahooFunction::IncomeStatements,
        YahooFunction::KeyRatios,
        YahooFunction::AnalystRecommendations,
    ];

    pub fn name(self) -> &'static str {
        match self {
            YahooFunction::CurrentPrice => "get_current_stock_price",
            YahooFunction::CompanyInfo => "get_company_info",
            YahooFunction::HistoricalPrices => "get_historical_stock_prices",
            YahooFunction::Fundamentals => "get_stock_fundamentals",
            YahooFunction::IncomeStatements => "get_income_statements",
            YahooFunction::KeyRatios => "get_key_financial_ratios",
            YahooFunction::AnalystRecommendations => "get_analyst_recommendations",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    fn description(self) -> &'static str {
        match self {
            YahooFunction::CurrentPrice => "Get the current stock price for a given stock symbol.",
            YahooFunction::CompanyInfo => {
                "Get company information and overview for a given stock symbol: name, sector, industry, country, website, business summary and headline market figures."
            }
            YahooFunction::HistoricalPrices => {
                "Get the historical closing prices for a given stock symbol, oldest first."
            }
            YahooFunction::Fundamentals => {
                "Get fundamental data for a given stock symbol: market cap, P/E, P/B, EPS, dividend yield, beta and 52 week range."
            }
            YahooFunction::IncomeStatements => "Get the annual income statements for a given stock symbol.",
            YahooFunction::KeyRatios => "Get key financial ratios for a given stock symbol.",
            YahooFunction::AnalystRecommendations => {
                "Get recent analyst rating changes and the recommendation trend for a given stock symbol."
            }
        }
    }

    fn parameters(self) -> Value {
        let symbol = schema::string("The stock symbol, e.g. NVDA");
        match self {
            YahooFunction::HistoricalPrices => schema::object(
                json!({
                    "symbol": symbol,
                    "period": schema::string_enum("Range of history to fetch. Defaults to 1mo.", &VALID_PERIODS),
                    "interval": schema::string_enum("Spacing between prices. Defaults to 1d.", &VALID_INTERVALS),
                }),
                &["symbol"],
            ),
            _ => schema::object(json!({ "symbol": symbol }), &["symbol"]),
        }
    }
}

/// Which functions the toolkit exposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct YahooToolsConfig {
    pub stock_price: bool,
    pub company_info: bool,
    pub historical_prices: bool,
    pub stock_fundamentals: bool,
    pub income_statements: bool,
    pub key_financial_ratios: bool,
    pub analyst_recommendations: bool,
}

impl YahooToolsConfig {
    pub fn all() -> Self {
        YahooToolsConfig {
            stock_price: true,
            company_info: true,
            historical_prices: true,
            stock_fundamentals: true,
            income_statements: true,
            key_financial_ratios: true,
            analyst_recommendations: true,
        }
    }

    pub fn enables(&self, function: YahooFunction) -> bool {
        match function {
            YahooFunction::CurrentPrice => self.stock_price,
            YahooFunction::CompanyInfo => self.company_info,
            YahooFunction::HistoricalPrices => self.historical_prices,
            YahooFunction::Fundamentals => self.stock_fundamentals,
            YahooFunction::IncomeStatements => self.income_statements,
            YahooFunction::KeyRatios => self.key_financial_ratios,
            YahooFunction::AnalystRecommendations => self.analyst_recommendations,
        }
    }
}

pub struct YahooFinanceTools {
    client: Client,
    config: YahooToolsConfig,
    crumb: Mutex<Option<String>>,
}

impl YahooFinanceTools {
    pub fn new(config: YahooToolsConfig) -> Result<Self, ToolError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .timeout(std::time::Duration::from_secs(20))
            .build()?;

        Ok(Self {
            client,
            config,
            crumb: Mutex::new(None),
        })
    }

    pub async fn current_price(&self, symbol: &str) -> Result<Value, ToolError> {
        let chart = self.chart(symbol, "1d", "1d").await?;
        current_price_json(symbol, &chart)
    }

    pub async fn historical_prices(&self, symbol: &str, period: &str, interval: &str) -> Result<Value, ToolError> {
        if !VALID_PERIODS.contains(&period) {
            return Err(ToolError::InvalidArguments(format!(
                "period must be one of {:?}, got '{}'",
                VALID_PERIODS, period
            )));
        }
        if !VALID_INTERVALS.contains(&interval) {
            return Err(ToolError::InvalidArguments(format!(
                "interval must be one of {:?}, got '{}'",
                VALID_INTERVALS, interval
            )));
        }
        let chart = self.chart(symbol, period, interval).await?;
        Ok(historical_prices_json(symbol, interval, &chart))
    }

    pub async fn company_info(&self, symbol: &str) -> Result<Value, ToolError> {
        let summary = self
            .quote_summary(symbol, &["assetProfile", "price", "summaryDetail", "financialData", "defaultKeyStatistics"])
            .await?;
        Ok(company_info_json(symbol, &summary))
    }

    pub async fn fundamentals(&self, symbol: &str) -> Result<Value, ToolError> {
        let summary = self
            .quote_summary(symbol, &["price", "summaryDetail", "defaultKeyStatistics", "financialData", "assetProfile"])
            .await?;
        Ok(fundamentals_json(symbol, &summary))
    }

    pub async fn income_statements(&self, symbol: &str) -> Result<Value, ToolError> {
        let summary = self
            .quote_summary(symbol, &["incomeStatementHistory", "defaultKeyStatistics"])
            .await?;
        Ok(income_statements_json(symbol, &summary))
    }

    pub async fn key_ratios(&self, symbol: &str) -> Result<Value, ToolError> {
        let summary = self
            .quote_summary(symbol, &["financialData", "defaultKeyStatistics", "summaryDetail"])
            .await?;
        Ok(key_ratios_json(symbol, &summary))
    }

    pub async fn analyst_recommendations(&self, symbol: &str) -> Result<Value, ToolError> {
        let summary = self
            .quote_summary(symbol, &["upgradeDowngradeHistory", "recommendationTrend", "financialData"])
            .await?;
        Ok(recommendations_json(symbol, &summary, Utc::now()))
    }

    async fn chart(&self, symbol: &str, range: &str, interval: &str) -> Result<ChartResult, ToolError> {
        let url = format!(
            "{}/{}?range={}&interval={}",
            CHART_URL,
            urlencoding::encode(symbol),
            range,
            interval
        );
        debug!("Fetching Yahoo chart: {}", url);

        let response = self.client.get(&url).header(header::REFERER, REFERER).send().await?;
        let status = response.status();
        let body = response.text().await?;
        parse_chart(status, &body)
    }

    async fn quote_summary(&self, symbol: &str, modules: &[&str]) -> Result<SummaryResult, ToolError> {
        let mut refresh = false;
        loop {
            let crumb = self.crumb(refresh).await?;
            let url = format!(
                "{}/{}?modules={}&crumb={}",
                SUMMARY_URL,
                urlencoding::encode(symbol),
                modules.join(","),
                urlencoding::encode(&crumb)
            );
            debug!("Fetching Yahoo quoteSummary for {} ({})", symbol, modules.join(","));

            let response = self.client.get(&url).header(header::REFERER, REFERER).send().await?;
            let status = response.status();

            if (status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN) && !refresh {
                warn!("Yahoo rejected crumb with {}, refreshing session", status);
                refresh = true;
                continue;
            }

            let body = response.text().await?;
            return parse_quote_summary(status, &body);
        }
    }

    /// Returns the session crumb, performing the cookie/crumb handshake when needed.
    async fn crumb(&self, refresh: bool) -> Result<String, ToolError> {
        let mut cached = self.crumb.lock().await;
        if !refresh {
            if let Some(crumb) = cached.as_ref() {
                return Ok(crumb.clone());
            }
        }

        // fc.yahoo.com answers 404 but still sets the session cookie.
        let _ = self.client.get(COOKIE_URL).header(header::REFERER, REFERER).send().await?;

        for endpoint in CRUMB_URLS {
            let response = match self.client.get(endpoint).header(header::REFERER, REFERER).send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Crumb request to {} failed: {}", endpoint, e);
                    continue;
                }
            };
            if !response.status().is_success() {
                warn!("Crumb endpoint {} returned {}", endpoint, response.status());
                continue;
            }
            let body = response.text().await?;
            let body = body.trim();
            if is_plausible_crumb(body) {
                info!("Obtained Yahoo session crumb");
                *cached = Some(body.to_string());
                return Ok(body.to_string());
            }
        }

        *cached = None;
        Err(ToolError::Upstream("failed to obtain Yahoo crumb".to_string()))
    }
}

#[async_trait]
impl MarketDataTool for YahooFinanceTools {
    fn definitions(&self) -> Vec<ToolDefinition> {
        YahooFunction::ALL
            .iter()
            .copied()
            .filter(|f| self.config.enables(*f))
            .map(|f| ToolDefinition::new(f.name(), f.description(), f.parameters()))
            .collect()
    }

    async fn call(&self, name: &str, arguments: &Value) -> Result<Value, ToolError> {
        let function = YahooFunction::from_name(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        if !self.config.enables(function) {
            return Err(ToolError::Disabled(name.to_string()));
        }

        let symbol = required_str(arguments, "symbol")?.to_uppercase();
        match function {
            YahooFunction::CurrentPrice => self.current_price(&symbol).await,
            YahooFunction::CompanyInfo => self.company_info(&symbol).await,
            YahooFunction::HistoricalPrices => {
                let period = optional_str(arguments, "period", "1mo")?;
                let interval = optional_str(arguments, "interval", "1d")?;
                self.historical_prices(&symbol, period, interval).await
            }
            YahooFunction::Fundamentals => self.fundamentals(&symbol).await,
            YahooFunction::IncomeStatements => self.income_statements(&symbol).await,
            YahooFunction::KeyRatios => self.key_ratios(&symbol).await,
            YahooFunction::AnalystRecommendations => self.analyst_recommendations(&symbol).await,
        }
    }
}

fn is_plausible_crumb(body: &str) -> bool {
    !body.is_empty()
        && body.len() < 100
        && !body.contains(' ')
        && !body.contains('<')
        && !body.to_lowercase().contains("too many requests")
}

// ============================================================================
// Provider response structures
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
struct YahooApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl YahooApiError {
    fn message(&self) -> String {
        match (&self.code, &self.description) {
            (Some(code), Some(description)) => format!("{}: {}", code, description),
            (None, Some(description)) => description.clone(),
            (Some(code), None) => code.clone(),
            (None, None) => "unknown Yahoo error".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<YahooApiError>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: ChartIndicators,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    regular_market_price: Option<f64>,
    #[serde(default)]
    regular_market_time: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct SummaryEnvelope {
    #[serde(rename = "quoteSummary")]
    quote_summary: SummaryBody,
}

#[derive(Debug, Deserialize)]
struct SummaryBody {
    #[serde(default)]
    result: Option<Vec<SummaryResult>>,
    #[serde(default)]
    error: Option<YahooApiError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResult {
    #[serde(default)]
    asset_profile: Option<AssetProfile>,
    #[serde(default)]
    price: Option<PriceModule>,
    #[serde(default)]
    summary_detail: Option<SummaryDetail>,
    #[serde(default)]
    default_key_statistics: Option<KeyStatistics>,
    #[serde(default)]
    financial_data: Option<FinancialData>,
    #[serde(default)]
    income_statement_history: Option<IncomeStatementHistory>,
    #[serde(default)]
    upgrade_downgrade_history: Option<UpgradeDowngradeHistory>,
    #[serde(default)]
    recommendation_trend: Option<RecommendationTrend>,
}

/// Yahoo wraps most numbers as `{"raw": 1.5, "fmt": "1.50"}`, or `{}` when unknown.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawValue {
    #[serde(default)]
    raw: Option<f64>,
}

fn raw(value: &Option<RawValue>) -> Option<f64> {
    value.as_ref().and_then(|v| v.raw).filter(|v| v.is_finite())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetProfile {
    #[serde(default)]
    sector: Option<String>,
    #[serde(default)]
    industry: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    long_business_summary: Option<String>,
    #[serde(default)]
    full_time_employees: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    #[serde(default)]
    long_name: Option<String>,
    #[serde(default)]
    short_name: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    exchange_name: Option<String>,
    #[serde(default)]
    regular_market_price: Option<RawValue>,
    #[serde(default)]
    market_cap: Option<RawValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryDetail {
    #[serde(default, rename = "trailingPE")]
    trailing_pe: Option<RawValue>,
    #[serde(default, rename = "forwardPE")]
    forward_pe: Option<RawValue>,
    #[serde(default)]
    dividend_yield: Option<RawValue>,
    #[serde(default)]
    beta: Option<RawValue>,
    #[serde(default)]
    fifty_two_week_high: Option<RawValue>,
    #[serde(default)]
    fifty_two_week_low: Option<RawValue>,
    #[serde(default)]
    fifty_day_average: Option<RawValue>,
    #[serde(default)]
    two_hundred_day_average: Option<RawValue>,
    #[serde(default)]
    market_cap: Option<RawValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyStatistics {
    #[serde(default)]
    price_to_book: Option<RawValue>,
    #[serde(default)]
    trailing_eps: Option<RawValue>,
    #[serde(default)]
    forward_eps: Option<RawValue>,
    #[serde(default)]
    peg_ratio: Option<RawValue>,
    #[serde(default)]
    shares_outstanding: Option<RawValue>,
    #[serde(default)]
    enterprise_value: Option<RawValue>,
    #[serde(default)]
    enterprise_to_ebitda: Option<RawValue>,
    #[serde(default)]
    book_value: Option<RawValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinancialData {
    #[serde(default)]
    current_price: Option<RawValue>,
    #[serde(default)]
    target_mean_price: Option<RawValue>,
    #[serde(default)]
    target_high_price: Option<RawValue>,
    #[serde(default)]
    target_low_price: Option<RawValue>,
    #[serde(default)]
    recommendation_key: Option<String>,
    #[serde(default)]
    number_of_analyst_opinions: Option<RawValue>,
    #[serde(default)]
    debt_to_equity: Option<RawValue>,
    #[serde(default)]
    current_ratio: Option<RawValue>,
    #[serde(default)]
    quick_ratio: Option<RawValue>,
    #[serde(default)]
    profit_margins: Option<RawValue>,
    #[serde(default)]
    gross_margins: Option<RawValue>,
    #[serde(default)]
    operating_margins: Option<RawValue>,
    #[serde(default)]
    return_on_assets: Option<RawValue>,
    #[serde(default)]
    return_on_equity: Option<RawValue>,
    #[serde(default)]
    total_revenue: Option<RawValue>,
    #[serde(default)]
    revenue_growth: Option<RawValue>,
    #[serde(default)]
    earnings_growth: Option<RawValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomeStatementHistory {
    #[serde(default)]
    income_statement_history: Vec<IncomeStatementEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomeStatementEntry {
    #[serde(default)]
    end_date: Option<RawValue>,
    #[serde(default)]
    total_revenue: Option<RawValue>,
    #[serde(default)]
    gross_profit: Option<RawValue>,
    #[serde(default)]
    operating_income: Option<RawValue>,
    #[serde(default)]
    net_income: Option<RawValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct UpgradeDowngradeHistory {
    #[serde(default)]
    history: Vec<GradeChange>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GradeChange {
    #[serde(default)]
    epoch_grade_date: Option<i64>,
    #[serde(default)]
    firm: Option<String>,
    #[serde(default)]
    to_grade: Option<String>,
    #[serde(default)]
    from_grade: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    current_price_target: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RecommendationTrend {
    #[serde(default)]
    trend: Vec<TrendPeriod>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrendPeriod {
    #[serde(default)]
    period: Option<String>,
    #[serde(default)]
    strong_buy: Option<u32>,
    #[serde(default)]
    buy: Option<u32>,
    #[serde(default)]
    hold: Option<u32>,
    #[serde(default)]
    sell: Option<u32>,
    #[serde(default)]
    strong_sell: Option<u32>,
}

// ============================================================================
// Parsing
// ============================================================================

fn parse_chart(status: StatusCode, body: &str) -> Result<ChartResult, ToolError> {
    let envelope: ChartEnvelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => {
            return Err(ToolError::Upstream(format!("Yahoo chart returned status {}", status)));
        }
        Err(e) => return Err(ToolError::Parse(e)),
    };

    if let Some(error) = envelope.chart.error {
        return Err(ToolError::Upstream(error.message()));
    }

    envelope
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| ToolError::Upstream("Yahoo chart returned no result".to_string()))
}

fn parse_quote_summary(status: StatusCode, body: &str) -> Result<SummaryResult, ToolError> {
    let envelope: SummaryEnvelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => {
            return Err(ToolError::Upstream(format!("Yahoo quoteSummary returned status {}", status)));
        }
        Err(e) => return Err(ToolError::Parse(e)),
    };

    if let Some(error) = envelope.quote_summary.error {
        return Err(ToolError::Upstream(error.message()));
    }

    envelope
        .quote_summary
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| ToolError::Upstream("Yahoo quoteSummary returned no result".to_string()))
}

fn format_epoch(secs: i64, intraday: bool) -> Option<String> {
    let timestamp = DateTime::<Utc>::from_timestamp(secs, 0)?;
    Some(if intraday {
        timestamp.to_rfc3339()
    } else {
        timestamp.format("%Y-%m-%d").to_string()
    })
}

// ============================================================================
// Tool output builders
// ============================================================================

fn current_price_json(symbol: &str, chart: &ChartResult) -> Result<Value, ToolError> {
    let price = chart
        .meta
        .regular_market_price
        .or_else(|| {
            chart
                .indicators
                .quote
                .first()
                .and_then(|q| q.close.iter().rev().flatten().next().copied())
        })
        .ok_or_else(|| ToolError::Upstream(format!("no current price available for {}", symbol)))?;

    Ok(json!({
        "symbol": symbol,
        "current_price": price,
        "currency": chart.meta.currency,
        "as_of": chart.meta.regular_market_time.and_then(|t| format_epoch(t, true)),
    }))
}

fn historical_prices_json(symbol: &str, interval: &str, chart: &ChartResult) -> Value {
    let intraday = interval.ends_with('m') || interval.ends_with('h');
    let empty = ChartQuote::default();
    let quote = chart.indicators.quote.first().unwrap_or(&empty);

    let prices: Vec<Value> = chart
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            let close = quote.close.get(i).copied().flatten()?;
            Some(json!({
                "date": format_epoch(*ts, intraday)?,
                "close": close,
                "volume": quote.volume.get(i).copied().flatten(),
            }))
        })
        .collect();

    json!({
        "symbol": symbol,
        "currency": chart.meta.currency,
        "interval": interval,
        "prices": prices,
    })
}

fn company_info_json(symbol: &str, summary: &SummaryResult) -> Value {
    let profile = summary.asset_profile.clone().unwrap_or_default();
    let price = summary.price.clone().unwrap_or_default();
    let detail = summary.summary_detail.clone().unwrap_or_default();
    let financial = summary.financial_data.clone().unwrap_or_default();
    let stats = summary.default_key_statistics.clone().unwrap_or_default();

    json!({
        "symbol": symbol,
        "name": price.long_name.or(price.short_name),
        "sector": profile.sector,
        "industry": profile.industry,
        "country": profile.country,
        "city": profile.city,
        "website": profile.website,
        "business_summary": profile.long_business_summary,
        "employees": profile.full_time_employees,
        "exchange": price.exchange_name,
        "currency": price.currency,
        "current_price": raw(&financial.current_price).or(raw(&price.regular_market_price)),
        "market_cap": raw(&price.market_cap).or(raw(&detail.market_cap)),
        "pe_ratio": raw(&detail.trailing_pe),
        "eps": raw(&stats.trailing_eps),
        "fifty_two_week_high": raw(&detail.fifty_two_week_high),
        "fifty_two_week_low": raw(&detail.fifty_two_week_low),
        "fifty_day_average": raw(&detail.fifty_day_average),
        "two_hundred_day_average": raw(&detail.two_hundred_day_average),
        "recommendation": financial.recommendation_key,
        "target_mean_price": raw(&financial.target_mean_price),
        "analyst_opinions": raw(&financial.number_of_analyst_opinions),
    })
}

fn fundamentals_json(symbol: &str, summary: &SummaryResult) -> Value {
    let profile = summary.asset_profile.clone().unwrap_or_default();
    let price = summary.price.clone().unwrap_or_default();
    let detail = summary.summary_detail.clone().unwrap_or_default();
    let stats = summary.default_key_statistics.clone().unwrap_or_default();
    let financial = summary.financial_data.clone().unwrap_or_default();

    json!({
        "symbol": symbol,
        "company_name": price.long_name.or(price.short_name),
        "sector": profile.sector,
        "industry": profile.industry,
        "market_cap": raw(&price.market_cap).or(raw(&detail.market_cap)),
        "enterprise_value": raw(&stats.enterprise_value),
        "pe_ratio": raw(&detail.trailing_pe),
        "forward_pe": raw(&detail.forward_pe),
        "pb_ratio": raw(&stats.price_to_book),
        "book_value": raw(&stats.book_value),
        "eps": raw(&stats.trailing_eps),
        "forward_eps": raw(&stats.forward_eps),
        "dividend_yield": raw(&detail.dividend_yield),
        "beta": raw(&detail.beta),
        "total_revenue": raw(&financial.total_revenue),
        "revenue_growth": raw(&financial.revenue_growth),
        "earnings_growth": raw(&financial.earnings_growth),
        "fifty_two_week_high": raw(&detail.fifty_two_week_high),
        "fifty_two_week_low": raw(&detail.fifty_two_week_low),
    })
}

fn key_ratios_json(symbol: &str, summary: &SummaryResult) -> Value {
    let detail = summary.summary_detail.clone().unwrap_or_default();
    let stats = summary.default_key_statistics.clone().unwrap_or_default();
    let financial = summary.financial_data.clone().unwrap_or_default();

    json!({
        "symbol": symbol,
        "pe_ratio": raw(&detail.trailing_pe),
        "forward_pe": raw(&detail.forward_pe),
        "pb_ratio": raw(&stats.price_to_book),
        "peg_ratio": raw(&stats.peg_ratio),
        "enterprise_to_ebitda": raw(&stats.enterprise_to_ebitda),
        "debt_to_equity": raw(&financial.debt_to_equity),
        "current_ratio": raw(&financial.current_ratio),
        "quick_ratio": raw(&financial.quick_ratio),
        "profit_margin": raw(&financial.profit_margins),
        "gross_margin": raw(&financial.gross_margins),
        "operating_margin": raw(&financial.operating_margins),
        "roa": raw(&financial.return_on_assets),
        "roe": raw(&financial.return_on_equity),
    })
}

fn income_statements_json(symbol: &str, summary: &SummaryResult) -> Value {
    let stats = summary.default_key_statistics.clone().unwrap_or_default();
    let shares = raw(&stats.shares_outstanding).filter(|s| *s > 0.0);
    let history = summary
        .income_statement_history
        .as_ref()
        .map(|h| h.income_statement_history.clone())
        .unwrap_or_default();

    // Yahoo lists the newest fiscal year first.
    let mut statements: Vec<(i64, Value)> = history
        .iter()
        .filter_map(|entry| {
            let end = raw(&entry.end_date)? as i64;
            let end_date = DateTime::<Utc>::from_timestamp(end, 0)?;
            let net_income = raw(&entry.net_income);
            Some((
                end,
                json!({
                    "year": end_date.year(),
                    "end_date": end_date.format("%Y-%m-%d").to_string(),
                    "total_revenue": raw(&entry.total_revenue),
                    "gross_profit": raw(&entry.gross_profit),
                    "operating_income": raw(&entry.operating_income),
                    "net_income": net_income,
                    "net_income_per_share": net_income.zip(shares).map(|(n, s)| n / s),
                }),
            ))
        })
        .collect();
    statements.sort_by_key(|(end, _)| *end);

    json!({
        "symbol": symbol,
        "trailing_eps": raw(&stats.trailing_eps),
        "statements": statements.into_iter().map(|(_, v)| v).collect::<Vec<_>>(),
    })
}

fn recommendations_json(symbol: &str, summary: &SummaryResult, now: DateTime<Utc>) -> Value {
    let cutoff = (now - Duration::days(RECOMMENDATION_WINDOW_DAYS)).timestamp();
    let history = summary
        .upgrade_downgrade_history
        .as_ref()
        .map(|h| h.history.clone())
        .unwrap_or_default();

    let changes: Vec<Value> = history
        .iter()
        .filter(|change| change.epoch_grade_date.map_or(false, |t| t >= cutoff))
        .take(MAX_RECOMMENDATIONS)
        .map(|change| {
            json!({
                "date": change.epoch_grade_date.and_then(|t| format_epoch(t, false)),
                "firm": change.firm,
                "recommendation": change.to_grade,
                "previous_recommendation": change.from_grade.as_deref().filter(|g| !g.is_empty()),
                "action": change.action,
                "target_price": change.current_price_target.filter(|p| *p > 0.0),
            })
        })
        .collect();

    let trend: Vec<Value> = summary
        .recommendation_trend
        .as_ref()
        .map(|t| t.trend.clone())
        .unwrap_or_default()
        .iter()
        .map(|period| {
            json!({
                "period": period.period,
                "strong_buy": period.strong_buy,
                "buy": period.buy,
                "hold": period.hold,
                "sell": period.sell,
                "strong_sell": period.strong_sell,
            })
        })
        .collect();

    let financial = summary.financial_data.clone().unwrap_or_default();
    json!({
        "symbol": symbol,
        "consensus": financial.recommendation_key,
        "target_mean_price": raw(&financial.target_mean_price),
        "target_high_price": raw(&financial.target_high_price),
        "target_low_price": raw(&financial.target_low_price),
        "rating_changes": changes,
        "trend": trend,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const CHART_BODY: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"currency": "USD", "symbol": "NVDA", "regularMarketPrice": 120.5, "regularMarketTime": 1730750400},
                "timestamp": [1730467800, 1730727000, 1730813400],
                "indicators": {"quote": [{
                    "close": [118.2, null, 120.5],
                    "volume": [1000, 2000, 3000]
                }]}
            }],
            "error": null
        }
    }"#;

    const SUMMARY_BODY: &str = r#"{
        "quoteSummary": {
            "result": [{
                "assetProfile": {
                    "sector": "Technology",
                    "industry": "Semiconductors",
                    "country": "United States",
                    "website": "https://www.nvidia.com",
                    "longBusinessSummary": "NVIDIA designs GPUs.",
                    "fullTimeEmployees": 29600
                },
                "price": {
                    "longName": "NVIDIA Corporation",
                    "currency": "USD",
                    "regularMarketPrice": {"raw": 120.5, "fmt": "120.50"},
                    "marketCap": {"raw": 2950000000000.0, "fmt": "2.95T"}
                },
                "summaryDetail": {"trailingPE": {"raw": 55.1}, "forwardPE": {"raw": 32.4}, "beta": {}, "dividendYield": {"raw": 0.0003}},
                "defaultKeyStatistics": {"priceToBook": {"raw": 48.0}, "trailingEps": {"raw": 2.13}, "sharesOutstanding": {"raw": 1000.0}},
                "financialData": {
                    "currentPrice": {"raw": 120.4},
                    "recommendationKey": "strong_buy",
                    "targetMeanPrice": {"raw": 150.2},
                    "debtToEquity": {"raw": 17.2},
                    "currentRatio": {"raw": 4.1},
                    "profitMargins": {"raw": 0.55},
                    "returnOnAssets": {"raw": 0.55},
                    "returnOnEquity": {"raw": 1.23}
                },
                "incomeStatementHistory": {"incomeStatementHistory": [
                    {"endDate": {"raw": 1706400000}, "totalRevenue": {"raw": 60922.0}, "grossProfit": {"raw": 44301.0}, "operatingIncome": {"raw": 32972.0}, "netIncome": {"raw": 29760.0}},
                    {"endDate": {"raw": 1674864000}, "totalRevenue": {"raw": 26974.0}, "grossProfit": {"raw": 15356.0}, "operatingIncome": {"raw": 4224.0}, "netIncome": {"raw": 4368.0}}
                ]},
                "upgradeDowngradeHistory": {"history": [
                    {"epochGradeDate": 1730419200, "firm": "Morgan Stanley", "toGrade": "Overweight", "fromGrade": "", "action": "main", "currentPriceTarget": 160.0},
                    {"epochGradeDate": 1700000000, "firm": "Old Firm", "toGrade": "Hold", "fromGrade": "Buy", "action": "down"}
                ]},
                "recommendationTrend": {"trend": [{"period": "0m", "strongBuy": 12, "buy": 40, "hold": 5, "sell": 0, "strongSell": 0}]}
            }],
            "error": null
        }
    }"#;

    fn summary() -> SummaryResult {
        parse_quote_summary(StatusCode::OK, SUMMARY_BODY).unwrap()
    }

    #[test]
    fn chart_parses_price_and_skips_missing_closes() {
        let chart = parse_chart(StatusCode::OK, CHART_BODY).unwrap();

        let price = current_price_json("NVDA", &chart).unwrap();
        assert_eq!(price["current_price"], 120.5);
        assert_eq!(price["currency"], "USD");

        let history = historical_prices_json("NVDA", "1d", &chart);
        let prices = history["prices"].as_array().unwrap();
        assert_eq!(prices.len(), 2);
        assert_eq!(prices[0]["date"], "2024-11-01");
        assert_eq!(prices[0]["close"], 118.2);
        assert_eq!(prices[1]["close"], 120.5);
    }

    #[test]
    fn chart_error_body_becomes_upstream_error() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = parse_chart(StatusCode::NOT_FOUND, body).unwrap_err();
        match err {
            ToolError::Upstream(message) => assert!(message.contains("symbol may be delisted")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn non_json_error_status_is_upstream() {
        let err = parse_quote_summary(StatusCode::TOO_MANY_REQUESTS, "Too Many Requests").unwrap_err();
        assert!(matches!(err, ToolError::Upstream(_)));
    }

    #[test]
    fn company_info_flattens_modules() {
        let info = company_info_json("NVDA", &summary());
        assert_eq!(info["name"], "NVIDIA Corporation");
        assert_eq!(info["sector"], "Technology");
        assert_eq!(info["business_summary"], "NVIDIA designs GPUs.");
        assert_eq!(info["current_price"], 120.4);
        assert_eq!(info["pe_ratio"], 55.1);
        assert_eq!(info["recommendation"], "strong_buy");
    }

    #[test]
    fn ratios_and_fundamentals_unwrap_raw_values() {
        let ratios = key_ratios_json("NVDA", &summary());
        assert_eq!(ratios["pe_ratio"], 55.1);
        assert_eq!(ratios["pb_ratio"], 48.0);
        assert_eq!(ratios["roe"], 1.23);
        assert_eq!(ratios["quick_ratio"], Value::Null);

        let fundamentals = fundamentals_json("NVDA", &summary());
        assert_eq!(fundamentals["pe_ratio"], 55.1);
        assert_eq!(fundamentals["forward_pe"], 32.4);
        assert_eq!(fundamentals["eps"], 2.13);
        assert_eq!(fundamentals["beta"], Value::Null);
        assert_eq!(fundamentals["market_cap"], 2950000000000.0);
    }

    #[test]
    fn income_statements_are_oldest_first() {
        let statements = income_statements_json("NVDA", &summary());
        let list = statements["statements"].as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["year"], 2023);
        assert_eq!(list[1]["year"], 2024);
        assert_eq!(list[1]["net_income_per_share"], 29.76);
        assert_eq!(statements["trailing_eps"], 2.13);
    }

    #[test]
    fn recommendations_keep_recent_changes_only() {
        let now = Utc.with_ymd_and_hms(2024, 11, 15, 0, 0, 0).unwrap();
        let recs = recommendations_json("NVDA", &summary(), now);
        let changes = recs["rating_changes"].as_array().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0]["firm"], "Morgan Stanley");
        assert_eq!(changes[0]["recommendation"], "Overweight");
        assert_eq!(changes[0]["previous_recommendation"], Value::Null);
        assert_eq!(changes[0]["target_price"], 160.0);
        assert_eq!(recs["trend"][0]["buy"], 40);
        assert_eq!(recs["consensus"], "strong_buy");
    }

    #[test]
    fn definitions_follow_config() {
        let tools = YahooFinanceTools::new(YahooToolsConfig {
            stock_price: true,
            historical_prices: true,
            ..YahooToolsConfig::default()
        })
        .unwrap();
        let names: Vec<String> = tools.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["get_current_stock_price", "get_historical_stock_prices"]);

        let all = YahooFinanceTools::new(YahooToolsConfig::all()).unwrap();
        assert_eq!(all.definitions().len(), YahooFunction::ALL.len());
    }

    #[tokio::test]
    async fn call_rejects_unknown_and_disabled_functions() {
        let tools = YahooFinanceTools::new(YahooToolsConfig::default()).unwrap();
        let args = json!({"symbol": "NVDA"});

        let err = tools.call("get_company_news", &args).await.unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(_)));

        let err = tools.call("get_company_info", &args).await.unwrap_err();
        assert!(matches!(err, ToolError::Disabled(_)));
    }

    #[tokio::test]
    async fn historical_prices_validates_period_before_fetching() {
        let tools = YahooFinanceTools::new(YahooToolsConfig::all()).unwrap();
        let err = tools
            .call("get_historical_stock_prices", &json!({"symbol": "NVDA", "period": "7mo"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn crumb_plausibility() {
        assert!(is_plausible_crumb("aB3.xYz9Q"));
        assert!(!is_plausible_crumb(""));
        assert!(!is_plausible_crumb("<html>oops</html>"));
        assert!(!is_plausible_crumb("Too Many Requests"));
    }
}
