// src/services/agent.rs
use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde_json::Value;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::models::{response_schema, StockAnalysisResponse};
use crate::BoxError;

use super::error::{AgentError, AnalysisError};
use super::llm::{ChatMessage, ChatModel, ChatRequest, OpenAiClient, OpenAiConfig, ResponseSchema, TokenUsage, ToolCall};
use super::tools::MarketDataTool;
use super::yahoo::{YahooFinanceTools, YahooToolsConfig};

pub const DESCRIPTION: &str = "You are an investment analyst that researches stock prices, analyst recommendations, stock fundamentals, and financial statements";

pub const INSTRUCTIONS: [&str; 3] = [
    "Use the available tools to gather the data; never invent figures.",
    "List historical prices and income statements oldest first and newest last.",
    "Use null for any value the tools could not provide.",
];

/// Produces a structured analysis for a ticker symbol.
#[async_trait]
pub trait StockAnalyst: Send + Sync {
    async fn analyze(&self, symbol: &str) -> Result<StockAnalysisResponse, AnalysisError>;
}

pub fn analysis_prompt(symbol: &str) -> String {
    format!(
        "Provide comprehensive analysis for {} stock including current price, company info, historical prices, analyst recommendations, financial ratios, and income statements",
        symbol
    )
}

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model: String,
    pub max_steps: usize,
    pub temperature: Option<f32>,
}

/// Outcome of one agent run.
#[derive(Debug, Clone)]
pub struct RunResponse {
    pub content: StockAnalysisResponse,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
}

pub struct FinanceAgent {
    model: Arc<dyn ChatModel>,
    tools: Arc<dyn MarketDataTool>,
    settings: AgentSettings,
}

impl FinanceAgent {
    pub fn new(model: Arc<dyn ChatModel>, tools: Arc<dyn MarketDataTool>, settings: AgentSettings) -> Self {
        Self { model, tools, settings }
    }

    /// Builds the agent the service runs with: OpenAI-compatible model plus every Yahoo function.
    pub fn from_config(config: &AppConfig) -> Result<Self, BoxError> {
        let model = OpenAiClient::new(OpenAiConfig {
            api_key: config.openai_api_key.clone(),
            api_base: config.openai_api_base.clone(),
            timeout_secs: config.llm_timeout_secs,
        })?;
        let tools = YahooFinanceTools::new(YahooToolsConfig::all())?;

        Ok(Self::new(
            Arc::new(model),
            Arc::new(tools),
            AgentSettings {
                model: config.openai_model.clone(),
                max_steps: config.agent_max_steps,
                temperature: None,
            },
        ))
    }

    fn system_prompt(&self) -> String {
        let mut prompt = String::from(DESCRIPTION);
        prompt.push_str("\n\nInstructions:\n");
        for instruction in INSTRUCTIONS {
            prompt.push_str("- ");
            prompt.push_str(instruction);
            prompt.push('\n');
        }
        prompt.push_str(
            "\nWhen you have gathered the data, reply with a single JSON object matching the StockAnalysisResponse schema and nothing else.",
        );
        prompt
    }

    /// Runs the tool-calling loop until the model produces a final answer.
    pub async fn run(&self, prompt: &str) -> Result<RunResponse, AgentError> {
        let mut request = ChatRequest {
            model: self.settings.model.clone(),
            messages: vec![ChatMessage::system(self.system_prompt()), ChatMessage::user(prompt)],
            tools: self.tools.definitions(),
            response_schema: Some(ResponseSchema {
                name: "StockAnalysisResponse".to_string(),
                schema: response_schema(),
            }),
            temperature: self.settings.temperature,
        };
        let mut usage = TokenUsage::default();
        let mut executed = Vec::new();

        for step in 1..=self.settings.max_steps {
            let response = self.model.chat(&request).await?;
            usage.add(response.usage);

            let calls = response.message.requested_tool_calls().to_vec();
            if calls.is_empty() {
                debug!("Final answer after {} step(s), finish_reason {:?}", step, response.finish_reason);
                let content = response.message.content.unwrap_or_default();
                let content = parse_structured_output(&content)?;
                return Ok(RunResponse {
                    content,
                    tool_calls: executed,
                    usage,
                });
            }

            request.messages.push(response.message);
            for call in calls {
                let output = self.execute(&call).await;
                request.messages.push(ChatMessage::tool_result(call.id.clone(), output));
                executed.push(call);
            }
        }

        Err(AgentError::StepLimitExceeded(self.settings.max_steps))
    }

    /// Runs one tool call; failures are returned to the model as text.
    async fn execute(&self, call: &ToolCall) -> String {
        info!("Running: {}({})", call.function.name, call.function.arguments);

        let arguments: Value = match serde_json::from_str(&call.function.arguments) {
            Ok(arguments) => arguments,
            Err(e) => {
                warn!("Tool {} received malformed arguments: {}", call.function.name, e);
                return format!("Error: arguments are not valid JSON: {}", e);
            }
        };

        match self.tools.call(&call.function.name, &arguments).await {
            Ok(output) => output.to_string(),
            Err(e) => {
                warn!("Tool {} failed: {}", call.function.name, e);
                format!("Error: {}", e)
            }
        }
    }
}

#[async_trait]
impl StockAnalyst for FinanceAgent {
    async fn analyze(&self, symbol: &str) -> Result<StockAnalysisResponse, AnalysisError> {
        match self.run(&analysis_prompt(symbol)).await {
            Ok(run) => {
                info!(
                    "Analysis for {} used {} tool call(s), {} prompt / {} completion tokens",
                    symbol,
                    run.tool_calls.len(),
                    run.usage.prompt_tokens,
                    run.usage.completion_tokens
                );
                Ok(run.content)
            }
            Err(e) => {
                error!("Analysis for {} failed ({}): {}", symbol, e.kind(), e);
                Err(AnalysisError::new(symbol, e))
            }
        }
    }
}

/// Parses the model's final message into a validated [`StockAnalysisResponse`].
pub fn parse_structured_output(content: &str) -> Result<StockAnalysisResponse, AgentError> {
    let body = strip_code_fence(content);
    if body.is_empty() {
        return Err(AgentError::EmptyResponse);
    }

    let parsed: StockAnalysisResponse =
        serde_json::from_str(body).map_err(|e| AgentError::SchemaMismatch(e.to_string()))?;
    parsed.validate().map_err(AgentError::SchemaMismatch)?;
    Ok(parsed)
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_end();
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    // Drop the language tag, e.g. ```json, whether or not a newline follows it
    rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()).trim()
}
