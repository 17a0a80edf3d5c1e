// src/routes.rs
use log::{error, info};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use warp::filters::body::BodyDeserializeError;
use warp::filters::cors::{Builder as CorsBuilder, CorsForbidden};
use warp::http::{Method, StatusCode};
use warp::reject::{LengthRequired, MethodNotAllowed, PayloadTooLarge, UnsupportedMediaType};
use warp::{Filter, Rejection, Reply};

use crate::handlers::analysis::analyze_stock;
use crate::handlers::error::ApiError;
use crate::handlers::hello_world;
use crate::services::agent::StockAnalyst;

pub const MAX_BODY_BYTES: u64 = 16 * 1024;

// Renders every rejection as `{"error": ...}` with a matching status.
async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found".to_string())
    } else if let Some(api_error) = err.find::<ApiError>() {
        (api_error.status, api_error.message.clone())
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e))
    } else if err.find::<PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large".to_string())
    } else if err.find::<LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "Content-Length header is required".to_string())
    } else if err.find::<UnsupportedMediaType>().is_some() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, "Request body must be JSON".to_string())
    } else if err.find::<MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed".to_string())
    } else if let Some(e) = err.find::<CorsForbidden>() {
        (StatusCode::FORBIDDEN, e.to_string())
    } else {
        error!("Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&json!({
            "error": message,
        })),
        code,
    ))
}

/// CORS policy for regular requests; `None` allows any origin.
pub fn cors(allowed_origins: Option<&[String]>) -> CorsBuilder {
    let builder = warp::cors()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["Content-Type", "Authorization"]);

    match allowed_origins {
        Some(origins) => builder.allow_origins(origins.iter().map(String::as_str)),
        None => builder.allow_any_origin(),
    }
}

// Answers OPTIONS on any path with permissive preflight headers and no body.
// Non-OPTIONS requests fall through as not-found so they don't mask 404s with 405s.
fn preflight() -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::method()
        .and_then(|method: Method| async move {
            if method == Method::OPTIONS {
                Ok(())
            } else {
                Err(warp::reject::not_found())
            }
        })
        .untuple_one()
        .map(|| {
            let reply = warp::reply::with_header(warp::reply(), "Content-Type", "application/json");
            let reply = warp::reply::with_header(reply, "Access-Control-Allow-Origin", "*");
            let reply = warp::reply::with_header(reply, "Access-Control-Allow-Headers", "Authorization, Content-Type");
            warp::reply::with_header(reply, "Access-Control-Allow-Methods", "POST")
        })
}

pub fn routes(
    analyst: Arc<dyn StockAnalyst>,
    allowed_origins: Option<&[String]>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    info!("Configuring routes...");

    let analyst_filter = warp::any().map(move || analyst.clone());

    let hello_route = warp::path::end().and(warp::get()).and_then(hello_world);

    let analysis_route = warp::path!("stock-analysis")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(analyst_filter)
        .and_then(analyze_stock);

    let api = hello_route.or(analysis_route).with(cors(allowed_origins));

    info!("All routes configured successfully.");

    preflight().or(api).recover(handle_rejection)
}
