// src/config.rs
use log::warn;
use regex::Regex;
use std::collections::HashMap;
use std::env;
use std::net::IpAddr;
use thiserror::Error;

use crate::services::llm::DEFAULT_API_BASE;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_ORIGINS: [&str; 2] = ["http://localhost:4321", "http://127.0.0.1:5000"];
pub const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_STEPS: usize = 10;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Origins allowed by CORS; `None` allows any origin.
    pub allowed_origins: Option<Vec<String>>,
    pub openai_api_key: String,
    pub openai_api_base: String,
    pub openai_model: String,
    pub llm_timeout_secs: u64,
    pub agent_max_steps: usize,
}

impl AppConfig {
    /// Reads the configuration from the process environment.
    ///
    /// Call `dotenv().ok()` first if a `.env` file should be honoured.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| vars.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());

        let host = match get("HOST") {
            Some(raw) => raw.parse().map_err(|e: std::net::AddrParseError| invalid("HOST", raw, e))?,
            None => IpAddr::from([127, 0, 0, 1]),
        };

        let port = match get("PORT") {
            Some(raw) => raw.parse().map_err(|e: std::num::ParseIntError| invalid("PORT", raw, e))?,
            None => {
                warn!("$PORT not set, defaulting to {}", DEFAULT_PORT);
                DEFAULT_PORT
            }
        };

        let allowed_origins = match get("ALLOWED_ORIGINS") {
            Some(raw) => parse_origins(raw)?,
            None => Some(DEFAULT_ORIGINS.iter().map(|o| o.to_string()).collect()),
        };

        let openai_api_key = get("OPENAI_API_KEY")
            .ok_or(ConfigError::Missing("OPENAI_API_KEY"))?
            .to_string();

        let openai_api_base = get("OPENAI_API_BASE").unwrap_or(DEFAULT_API_BASE).to_string();
        if !openai_api_base.starts_with("http://") && !openai_api_base.starts_with("https://") {
            return Err(invalid("OPENAI_API_BASE", &openai_api_base, "must be an http(s) URL"));
        }

        let openai_model = get("OPENAI_MODEL").unwrap_or(DEFAULT_MODEL).to_string();

        let llm_timeout_secs = match get("LLM_TIMEOUT_SECS") {
            Some(raw) => positive("LLM_TIMEOUT_SECS", raw)? as u64,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let agent_max_steps = match get("AGENT_MAX_STEPS") {
            Some(raw) => positive("AGENT_MAX_STEPS", raw)?,
            None => DEFAULT_MAX_STEPS,
        };

        Ok(AppConfig {
            host,
            port,
            allowed_origins,
            openai_api_key,
            openai_api_base,
            openai_model,
            llm_timeout_secs,
            agent_max_steps,
        })
    }
}

fn invalid(name: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn positive(name: &'static str, raw: &str) -> Result<usize, ConfigError> {
    match raw.parse::<usize>() {
        Ok(0) => Err(invalid(name, raw, "must be greater than zero")),
        Ok(n) => Ok(n),
        Err(e) => Err(invalid(name, raw, e)),
    }
}

/// Parses a comma-separated origin list; `*` anywhere means any origin.
fn parse_origins(raw: &str) -> Result<Option<Vec<String>>, ConfigError> {
    let origin_re = Regex::new(r"^https?://[^/\s]+$").map_err(|e| invalid("ALLOWED_ORIGINS", raw, e))?;

    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(|o| o.trim_end_matches('/').to_string())
        .collect();

    if origins.iter().any(|o| o == "*") {
        return Ok(None);
    }

    if origins.is_empty() {
        return Err(invalid("ALLOWED_ORIGINS", raw, "no origins listed"));
    }

    if let Some(bad) = origins.iter().find(|o| !origin_re.is_match(o)) {
        return Err(invalid("ALLOWED_ORIGINS", bad, "expected scheme://host[:port]"));
    }

    Ok(Some(origins))
}
