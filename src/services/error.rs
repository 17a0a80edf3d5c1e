// src/services/error.rs
use thiserror::Error;

/// Failures talking to the chat-completions endpoint.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid API key or authentication failed")]
    Authentication,

    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected response format: {0}")]
    UnexpectedResponse(String),
}

/// Failures inside a market-data function.
///
/// These are reported back to the model as tool output, not to the caller.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool is disabled: {0}")]
    Disabled(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("failed to parse provider response: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// The model answered, but not with something matching the declared schema.
    #[error("response does not match the StockAnalysis schema: {0}")]
    SchemaMismatch(String),

    #[error("model returned an empty response")]
    EmptyResponse,

    #[error("agent exceeded {0} model round-trips without a final answer")]
    StepLimitExceeded(usize),
}

impl AgentError {
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Llm(_) => "llm",
            AgentError::SchemaMismatch(_) => "schema_mismatch",
            AgentError::EmptyResponse => "empty_response",
            AgentError::StepLimitExceeded(_) => "step_limit",
        }
    }
}

/// The single error surfaced by a stock analysis, carrying the original message.
#[derive(Debug, Error)]
#[error("Error analyzing stock {symbol}: {source}")]
pub struct AnalysisError {
    pub symbol: String,
    #[source]
    pub source: AgentError,
}

impl AnalysisError {
    pub fn new(symbol: impl Into<String>, source: AgentError) -> Self {
        AnalysisError {
            symbol: symbol.into(),
            source,
        }
    }
}
