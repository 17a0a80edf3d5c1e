// src/handlers/mod.rs
pub mod analysis;
pub mod error;

/// Liveness check.
pub async fn hello_world() -> Result<&'static str, warp::Rejection> {
    Ok("Hello World")
}
