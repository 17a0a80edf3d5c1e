// src/models.rs
use chrono::{NaiveDate, NaiveTime};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HistoricalPrice {
    /// Date of the stock price. Use ISO 8601 to format this value.
    #[serde(rename = "datevalue", alias = "date", default)]
    pub date: Option<String>,
    /// Closing price of the stock on that date
    #[serde(default)]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalystRecommendation {
    /// Date of the recommendation. Use ISO 8601 to format this value.
    #[serde(rename = "datevalue", alias = "date", default)]
    pub date: Option<String>,
    /// Name of the analyzing firm
    #[serde(default)]
    pub firm: Option<String>,
    /// Analyst recommendation (e.g., Buy, Sell, Hold)
    #[serde(default)]
    pub recommendation: Option<String>,
    /// Price target if available
    #[serde(default)]
    pub target_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct CompanyInfo {
    /// Company name
    #[serde(default)]
    pub name: Option<String>,
    /// Company sector
    #[serde(default)]
    pub sector: Option<String>,
    /// Company industry
    #[serde(default)]
    pub industry: Option<String>,
    /// Company country
    #[serde(default)]
    pub country: Option<String>,
    /// Company website URL
    #[serde(default)]
    pub website: Option<String>,
    /// Brief business summary
    #[serde(default)]
    pub business_summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct FinancialRatios {
    /// Price to Earnings Ratio
    #[serde(default)]
    pub pe_ratio: Option<f64>,
    /// Price to Book Ratio
    #[serde(default)]
    pub pb_ratio: Option<f64>,
    /// Debt to Equity Ratio
    #[serde(default)]
    pub debt_to_equity: Option<f64>,
    /// Current Ratio
    #[serde(default)]
    pub current_ratio: Option<f64>,
    /// Profit Margin
    #[serde(default)]
    pub profit_margin: Option<f64>,
    /// Return on Assets
    #[serde(default)]
    pub roa: Option<f64>,
    /// Return on Equity
    #[serde(default)]
    pub roe: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IncomeStatement {
    /// Year of the income statement
    #[serde(default)]
    pub year: Option<i32>,
    pub total_revenue: f64,
    pub gross_profit: f64,
    pub operating_income: f64,
    pub net_income: f64,
    pub eps: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StockAnalysis {
    /// Current stock price
    pub current_price: f64,
    /// Detailed company information
    pub company_info: CompanyInfo,
    /// Stock prices for last 10 days, Add old day data at top and newest day data at last
    pub historical_prices: Vec<HistoricalPrice>,
    /// Analyst recommendations for last 3 months
    pub analyst_recommendations: Vec<AnalystRecommendation>,
    /// Key financial ratios
    pub financial_ratios: FinancialRatios,
    /// Income statements for last 3 years, Add old day data at top and newest day data at last
    pub income_statements: Vec<IncomeStatement>,
}

/// Envelope the agent is asked to emit and the endpoint returns verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StockAnalysisResponse {
    /// Comprehensive stock analysis data
    pub stock_analysis: StockAnalysis,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct StockRequest {
    /// Stock symbol to analyze
    #[serde(default)]
    pub symbol: Option<String>,
}

/// JSON Schema of [`StockAnalysisResponse`], handed to the model as the output contract.
pub fn response_schema() -> Value {
    let schema = schemars::schema_for!(StockAnalysisResponse);
    serde_json::to_value(schema).unwrap_or(Value::Null)
}

impl StockAnalysisResponse {
    /// Checks the constraints typing alone cannot express.
    ///
    /// Returns every violation found, joined into one message.
    pub fn validate(&self) -> Result<(), String> {
        let analysis = &self.stock_analysis;
        let mut violations = Vec::new();

        if !analysis.current_price.is_finite() || analysis.current_price <= 0.0 {
            violations.push(format!(
                "current_price must be a positive number, got {}",
                analysis.current_price
            ));
        }

        for (i, entry) in analysis.historical_prices.iter().enumerate() {
            check_date(&mut violations, "historical_prices", i, entry.date.as_deref());
            check_amount(&mut violations, "historical_prices", i, "price", entry.price);
        }

        for (i, entry) in analysis.analyst_recommendations.iter().enumerate() {
            check_date(&mut violations, "analyst_recommendations", i, entry.date.as_deref());
            check_amount(&mut violations, "analyst_recommendations", i, "target_price", entry.target_price);
        }

        for (i, statement) in analysis.income_statements.iter().enumerate() {
            if let Some(year) = statement.year {
                if !(1900..=2100).contains(&year) {
                    violations.push(format!("income_statements[{}].year {} is out of range", i, year));
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations.join("; "))
        }
    }
}

fn check_date(violations: &mut Vec<String>, list: &str, index: usize, value: Option<&str>) {
    if let Some(raw) = value {
        if !is_iso8601(raw) {
            violations.push(format!("{}[{}].datevalue '{}' is not an ISO 8601 date", list, index, raw));
        }
    }
}

fn check_amount(violations: &mut Vec<String>, list: &str, index: usize, field: &str, value: Option<f64>) {
    if let Some(amount) = value {
        if !amount.is_finite() || amount < 0.0 {
            violations.push(format!("{}[{}].{} must be non-negative, got {}", list, index, field, amount));
        }
    }
}

/// Accepts ISO 8601 calendar dates, optionally followed by `T` and a time of day.
///
/// Dates may be extended (`2024-05-01`) or basic (`20240501`). Times may stop at
/// minutes or carry seconds and fractions, with an optional `Z`, `+hh`, `+hhmm` or
/// `+hh:mm` designator.
pub fn is_iso8601(raw: &str) -> bool {
    let raw = raw.trim();
    let (date, time) = match raw.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (raw, None),
    };

    is_iso_date(date) && time.map_or(true, is_iso_time)
}

fn is_iso_date(raw: &str) -> bool {
    if raw.len() == 8 && raw.bytes().all(|b| b.is_ascii_digit()) {
        let extended = format!("{}-{}-{}", &raw[..4], &raw[4..6], &raw[6..]);
        return NaiveDate::parse_from_str(&extended, "%Y-%m-%d").is_ok();
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok()
}

fn is_iso_time(raw: &str) -> bool {
    let Some(local) = strip_utc_offset(raw) else {
        return false;
    };
    ["%H:%M", "%H:%M:%S", "%H:%M:%S%.f", "%H%M", "%H%M%S"]
        .iter()
        .any(|format| NaiveTime::parse_from_str(local, format).is_ok())
}

// Returns the local time with any zone designator removed, or `None` if the designator is malformed.
fn strip_utc_offset(raw: &str) -> Option<&str> {
    if let Some(local) = raw.strip_suffix('Z') {
        return Some(local);
    }
    let Some(index) = raw.rfind(|c: char| c == '+' || c == '-') else {
        return Some(raw);
    };

    let offset = &raw[index + 1..];
    let digits: String = offset.chars().filter(|c| *c != ':').collect();
    let well_formed = matches!(offset.len(), 2 | 4 | 5)
        && digits.bytes().all(|b| b.is_ascii_digit())
        && (offset.len() != 5 || offset.as_bytes()[2] == b':')
        && matches!(digits.len(), 2 | 4);
    well_formed.then_some(&raw[..index])
}
