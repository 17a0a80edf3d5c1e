use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use warp::http::StatusCode;

use stock_analysis_api::config::DEFAULT_ORIGINS;
use stock_analysis_api::models::StockAnalysisResponse;
use stock_analysis_api::routes::routes;
use stock_analysis_api::services::agent::StockAnalyst;
use stock_analysis_api::services::error::{AgentError, AnalysisError};

struct StubAnalyst {
    outcome: Result<StockAnalysisResponse, String>,
    symbols: Mutex<Vec<String>>,
}

impl StubAnalyst {
    fn returning(analysis: StockAnalysisResponse) -> Arc<Self> {
        Arc::new(Self {
            outcome: Ok(analysis),
            symbols: Mutex::new(Vec::new()),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            outcome: Err(message.to_string()),
            symbols: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl StockAnalyst for StubAnalyst {
    async fn analyze(&self, symbol: &str) -> Result<StockAnalysisResponse, AnalysisError> {
        self.symbols.lock().unwrap().push(symbol.to_string());
        match &self.outcome {
            Ok(analysis) => Ok(analysis.clone()),
            Err(message) => Err(AnalysisError::new(symbol, AgentError::SchemaMismatch(message.clone()))),
        }
    }
}

fn analysis_json(current_price: f64) -> Value {
    json!({
        "stock_analysis": {
            "current_price": current_price,
            "company_info": {
                "name": "NVIDIA Corporation",
                "sector": "Technology",
                "industry": "Semiconductors",
                "country": "United States",
                "website": "https://www.nvidia.com",
                "business_summary": "Designs GPUs."
            },
            "historical_prices": [
                {"datevalue": "2024-11-01", "price": 118.2},
                {"datevalue": "2024-11-04", "price": 120.5}
            ],
            "analyst_recommendations": [
                {"datevalue": "2024-10-15", "firm": "Morgan Stanley", "recommendation": "Buy", "target_price": 150.0}
            ],
            "financial_ratios": {
                "pe_ratio": 55.1, "pb_ratio": 48.0, "debt_to_equity": 17.2, "current_ratio": 4.1,
                "profit_margin": 0.55, "roa": 0.55, "roe": 1.23
            },
            "income_statements": [
                {"year": 2024, "total_revenue": 60922.0, "gross_profit": 44301.0, "operating_income": 32972.0, "net_income": 29760.0, "eps": 1.19}
            ]
        }
    })
}

fn analysis(current_price: f64) -> StockAnalysisResponse {
    serde_json::from_value(analysis_json(current_price)).unwrap()
}

fn default_origins() -> Vec<String> {
    DEFAULT_ORIGINS.iter().map(|o| o.to_string()).collect()
}

fn body_json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn root_returns_hello_world() {
    let origins = default_origins();
    let api = routes(StubAnalyst::returning(analysis(120.5)), Some(&origins));

    let res = warp::test::request().method("GET").path("/").reply(&api).await;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.body().as_ref(), b"Hello World");
}

#[tokio::test]
async fn options_on_any_path_returns_permissive_preflight() {
    let origins = default_origins();
    let api = routes(StubAnalyst::returning(analysis(120.5)), Some(&origins));

    for path in ["/stock-analysis", "/", "/anything/else"] {
        let res = warp::test::request()
            .method("OPTIONS")
            .path(path)
            .header("origin", "https://not-configured.example")
            .header("access-control-request-method", "POST")
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::OK, "{}", path);
        assert!(res.body().is_empty());
        assert_eq!(res.headers()["access-control-allow-origin"], "*");
        assert_eq!(res.headers()["access-control-allow-methods"], "POST");
        assert_eq!(res.headers()["access-control-allow-headers"], "Authorization, Content-Type");
    }
}

#[tokio::test]
async fn missing_symbol_is_bad_request() {
    let stub = StubAnalyst::returning(analysis(120.5));
    let origins = default_origins();
    let api = routes(stub.clone(), Some(&origins));

    for body in [json!({}), json!({"symbol": ""}), json!({"symbol": null}), json!({"symbol": "   "})] {
        let res = warp::test::request()
            .method("POST")
            .path("/stock-analysis")
            .json(&body)
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{}", body);
        assert_eq!(body_json(res.body())["error"], "Stock symbol is required");
    }

    assert!(stub.symbols.lock().unwrap().is_empty());
}

#[tokio::test]
async fn valid_symbol_returns_agent_output() {
    let stub = StubAnalyst::returning(analysis(120.5));
    let origins = default_origins();
    let api = routes(stub.clone(), Some(&origins));

    let res = warp::test::request()
        .method("POST")
        .path("/stock-analysis")
        .json(&json!({"symbol": "NVDA"}))
        .reply(&api)
        .await;

    assert_eq!(res.status(), StatusCode::OK);
    let raw = std::str::from_utf8(res.body()).unwrap();
    assert!(raw.contains("\"current_price\":120.5"));
    assert_eq!(body_json(res.body()), analysis_json(120.5));
    assert_eq!(*stub.symbols.lock().unwrap(), vec!["NVDA".to_string()]);
}

#[tokio::test]
async fn symbol_is_normalized_before_analysis() {
    let stub = StubAnalyst::returning(analysis(120.5));
    let origins = default_origins();
    let api = routes(stub.clone(), Some(&origins));

    let res = warp::test::request()
        .method("POST")
        .path("/stock-analysis")
        .json(&json!({"symbol": "  nvda "}))
        .reply(&api)
        .await;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(*stub.symbols.lock().unwrap(), vec!["NVDA".to_string()]);
}

#[tokio::test]
async fn agent_failure_is_internal_error_with_message() {
    let origins = default_origins();
    let api = routes(StubAnalyst::failing("missing field `current_price`"), Some(&origins));

    let res = warp::test::request()
        .method("POST")
        .path("/stock-analysis")
        .json(&json!({"symbol": "NVDA"}))
        .reply(&api)
        .await;

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error = body_json(res.body())["error"].as_str().unwrap().to_string();
    assert!(error.starts_with("Error analyzing stock NVDA:"));
    assert!(error.contains("missing field `current_price`"));
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
    let stub = StubAnalyst::returning(analysis(120.5));
    let origins = default_origins();
    let api = routes(stub.clone(), Some(&origins));

    let res = warp::test::request()
        .method("POST")
        .path("/stock-analysis")
        .header("content-type", "application/json")
        .body("{not json")
        .reply(&api)
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(res.body())["error"].as_str().unwrap().starts_with("Invalid request body"));

    let res = warp::test::request()
        .method("POST")
        .path("/stock-analysis")
        .json(&json!({"symbol": "DROP TABLE"}))
        .reply(&api)
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(res.body())["error"].as_str().unwrap().starts_with("Invalid stock symbol"));

    assert!(stub.symbols.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_paths_and_methods() {
    let origins = default_origins();
    let api = routes(StubAnalyst::returning(analysis(120.5)), Some(&origins));

    let res = warp::test::request().method("GET").path("/nope").reply(&api).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(res.body())["error"], "Not Found");

    let res = warp::test::request().method("GET").path("/stock-analysis").reply(&api).await;
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn cors_is_restricted_to_configured_origins() {
    let origins = default_origins();
    let api = routes(StubAnalyst::returning(analysis(120.5)), Some(&origins));

    let res = warp::test::request()
        .method("POST")
        .path("/stock-analysis")
        .header("origin", "http://localhost:4321")
        .json(&json!({"symbol": "NVDA"}))
        .reply(&api)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["access-control-allow-origin"], "http://localhost:4321");

    let res = warp::test::request()
        .method("POST")
        .path("/stock-analysis")
        .header("origin", "https://evil.example")
        .json(&json!({"symbol": "NVDA"}))
        .reply(&api)
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn any_origin_when_unrestricted() {
    let api = routes(StubAnalyst::returning(analysis(120.5)), None);

    let res = warp::test::request()
        .method("GET")
        .path("/")
        .header("origin", "https://anywhere.example")
        .reply(&api)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("access-control-allow-origin"));
}
