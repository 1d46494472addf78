//! HTTP-backed reasoning oracles.
//!
//! OpenAI and Ollama share the chat-completions wire format with function
//! tools; Anthropic uses the messages API with `tool_use` blocks. Both render
//! the same transcript: system prompt, prior turns, the user query, then each
//! completed cycle as an assistant tool request followed by its results.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};

use partsage_core::config::{LlmConfig, LlmProvider};
use partsage_core::domain::conversation::Role;

use crate::oracle::{OracleDecision, OracleError, OracleRequest, ReasoningOracle};
use crate::tools::{ToolInvocation, ToolObservation};

pub const SYSTEM_PROMPT: &str = "You are the PartSelect parts assistant. You help customers with \
refrigerator and dishwasher parts only: finding parts, checking compatibility with appliance models, \
troubleshooting symptoms, installation and repair guidance, and store policies such as returns, \
shipping and warranty. Politely decline anything else.\n\
Use catalog_search for prices, ratings, availability, part numbers and compatibility. \
Use knowledge_search for repair guides, troubleshooting and policies. \
Never invent part numbers, prices or compatibility; rely only on tool results. \
Use at most 10 tool calls per question. Keep answers concise, mention price and rating when you \
recommend a part, and cite source URLs for repair or policy information.";

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 1024;

pub fn oracle_from_config(config: &LlmConfig) -> Result<Arc<dyn ReasoningOracle>, OracleError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|error| OracleError::Rejected(format!("failed to build http client: {error}")))?;

    let oracle: Arc<dyn ReasoningOracle> = match config.provider {
        LlmProvider::OpenAi => Arc::new(ChatCompletionsOracle {
            client,
            endpoint: format!("{}/chat/completions", base_url(config, OPENAI_BASE_URL)),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
        }),
        LlmProvider::Ollama => Arc::new(ChatCompletionsOracle {
            client,
            endpoint: format!("{}/v1/chat/completions", base_url(config, "http://localhost:11434")),
            model: config.model.clone(),
            api_key: None,
            timeout_secs: config.timeout_secs,
        }),
        LlmProvider::Anthropic => Arc::new(AnthropicOracle {
            client,
            endpoint: format!("{}/v1/messages", base_url(config, ANTHROPIC_BASE_URL)),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
        }),
    };
    Ok(oracle)
}

fn base_url(config: &LlmConfig, fallback: &str) -> String {
    config
        .base_url
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(fallback)
        .trim_end_matches('/')
        .to_string()
}

/// Completed cycles: each invocation paired with its observation, grouped by
/// the iteration that produced them.
fn completed_cycles<'a>(
    request: &OracleRequest<'a>,
) -> Vec<Vec<(&'a ToolInvocation, &'a ToolObservation)>> {
    let mut cycles: Vec<Vec<(&ToolInvocation, &ToolObservation)>> = Vec::new();
    let mut current_iteration = None;

    for observation in request.observations {
        let Some(invocation) =
            request.invocations.iter().find(|invocation| invocation.call_id == observation.call_id)
        else {
            continue;
        };
        if current_iteration != Some(observation.iteration) {
            cycles.push(Vec::new());
            current_iteration = Some(observation.iteration);
        }
        if let Some(cycle) = cycles.last_mut() {
            cycle.push((invocation, observation));
        }
    }
    cycles
}

async fn send_json(
    builder: RequestBuilder,
    body: &Value,
    timeout_secs: u64,
) -> Result<Value, OracleError> {
    let response = builder.json(body).send().await.map_err(|error| {
        if error.is_timeout() {
            OracleError::Timeout(timeout_secs)
        } else {
            OracleError::Unavailable(format!("request failed: {error}"))
        }
    })?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Err(OracleError::Unavailable(format!("provider returned {status}")));
    }
    if !status.is_success() {
        return Err(OracleError::Rejected(format!("provider returned {status}")));
    }

    response
        .json::<Value>()
        .await
        .map_err(|error| OracleError::InvalidResponse(format!("failed to decode body: {error}")))
}

pub struct ChatCompletionsOracle {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
    timeout_secs: u64,
}

#[async_trait]
impl ReasoningOracle for ChatCompletionsOracle {
    async fn decide(&self, request: &OracleRequest<'_>) -> Result<OracleDecision, OracleError> {
        let body = chat_completions_body(&self.model, request);
        let mut builder = self.client.post(&self.endpoint);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }
        let response = send_json(builder, &body, self.timeout_secs).await?;
        parse_chat_completion(response)
    }
}

pub fn chat_completions_body(model: &str, request: &OracleRequest<'_>) -> Value {
    let mut messages = vec![json!({ "role": "system", "content": SYSTEM_PROMPT })];
    for turn in request.query.history.iter() {
        let role = match turn.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        messages.push(json!({ "role": role, "content": turn.content }));
    }
    messages.push(json!({ "role": "user", "content": request.query.text }));

    for cycle in completed_cycles(request) {
        let tool_calls = cycle
            .iter()
            .map(|(invocation, _)| {
                json!({
                    "id": invocation.call_id,
                    "type": "function",
                    "function": {
                        "name": invocation.tool_name,
                        "arguments": invocation.arguments.to_string(),
                    },
                })
            })
            .collect::<Vec<_>>();
        messages.push(json!({ "role": "assistant", "content": Value::Null, "tool_calls": tool_calls }));
        for (invocation, observation) in cycle {
            messages.push(json!({
                "role": "tool",
                "tool_call_id": invocation.call_id,
                "content": observation.to_oracle_json().to_string(),
            }));
        }
    }

    let tools = request
        .tools
        .iter()
        .map(|schema| {
            json!({
                "type": "function",
                "function": {
                    "name": schema.name,
                    "description": schema.guidance(),
                    "parameters": schema.to_json_schema(),
                },
            })
        })
        .collect::<Vec<_>>();

    json!({
        "model": model,
        "messages": messages,
        "tools": tools,
        "tool_choice": "auto",
        "temperature": 0,
    })
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChatToolCall>,
}

#[derive(Debug, Deserialize)]
struct ChatToolCall {
    #[serde(default)]
    id: String,
    function: ChatFunction,
}

#[derive(Debug, Deserialize)]
struct ChatFunction {
    name: String,
    /// OpenAI sends a JSON-encoded string; Ollama sometimes sends an object.
    arguments: Value,
}

pub fn parse_chat_completion(body: Value) -> Result<OracleDecision, OracleError> {
    let completion: ChatCompletion = serde_json::from_value(body)
        .map_err(|error| OracleError::InvalidResponse(format!("unexpected shape: {error}")))?;
    let message = completion
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| OracleError::InvalidResponse("no choices returned".to_string()))?;

    if !message.tool_calls.is_empty() {
        let invocations = message
            .tool_calls
            .into_iter()
            .map(|call| {
                let arguments = match call.function.arguments {
                    // Unparseable text is passed through and rejected by schema validation.
                    Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
                    other => other,
                };
                ToolInvocation::new(call.id, call.function.name, arguments)
            })
            .collect();
        return Ok(OracleDecision::UseTools(invocations));
    }

    match message.content {
        Some(text) if !text.trim().is_empty() => Ok(OracleDecision::FinalAnswer(text)),
        _ => Err(OracleError::InvalidResponse("neither tool calls nor content".to_string())),
    }
}

pub struct AnthropicOracle {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
    timeout_secs: u64,
}

#[async_trait]
impl ReasoningOracle for AnthropicOracle {
    async fn decide(&self, request: &OracleRequest<'_>) -> Result<OracleDecision, OracleError> {
        let body = anthropic_body(&self.model, request);
        let mut builder =
            self.client.post(&self.endpoint).header("anthropic-version", ANTHROPIC_VERSION);
        if let Some(api_key) = &self.api_key {
            builder = builder.header("x-api-key", api_key.expose_secret());
        }
        let response = send_json(builder, &body, self.timeout_secs).await?;
        parse_anthropic(response)
    }
}

pub fn anthropic_body(model: &str, request: &OracleRequest<'_>) -> Value {
    let mut messages = Vec::new();
    for turn in request.query.history.iter() {
        let role = match turn.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        messages.push(json!({ "role": role, "content": turn.content }));
    }
    messages.push(json!({ "role": "user", "content": request.query.text }));

    for cycle in completed_cycles(request) {
        let uses = cycle
            .iter()
            .map(|(invocation, _)| {
                let input = if invocation.arguments.is_object() {
                    invocation.arguments.clone()
                } else {
                    json!({})
                };
                json!({
                    "type": "tool_use",
                    "id": invocation.call_id,
                    "name": invocation.tool_name,
                    "input": input,
                })
            })
            .collect::<Vec<_>>();
        let results = cycle
            .iter()
            .map(|(invocation, observation)| {
                json!({
                    "type": "tool_result",
                    "tool_use_id": invocation.call_id,
                    "content": observation.to_oracle_json().to_string(),
                    "is_error": observation.error_kind().is_some(),
                })
            })
            .collect::<Vec<_>>();
        messages.push(json!({ "role": "assistant", "content": uses }));
        messages.push(json!({ "role": "user", "content": results }));
    }

    let tools = request
        .tools
        .iter()
        .map(|schema| {
            json!({
                "name": schema.name,
                "description": schema.guidance(),
                "input_schema": schema.to_json_schema(),
            })
        })
        .collect::<Vec<_>>();

    json!({
        "model": model,
        "max_tokens": MAX_OUTPUT_TOKENS,
        "system": SYSTEM_PROMPT,
        "messages": messages,
        "tools": tools,
        "temperature": 0,
    })
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

pub fn parse_anthropic(body: Value) -> Result<OracleDecision, OracleError> {
    let response: AnthropicResponse = serde_json::from_value(body)
        .map_err(|error| OracleError::InvalidResponse(format!("unexpected shape: {error}")))?;

    let mut text = String::new();
    let mut invocations = Vec::new();
    for block in response.content {
        match block {
            AnthropicBlock::Text { text: part } => text.push_str(&part),
            AnthropicBlock::ToolUse { id, name, input } => {
                invocations.push(ToolInvocation::new(id, name, input));
            }
            AnthropicBlock::Other => {}
        }
    }

    if !invocations.is_empty() {
        return Ok(OracleDecision::UseTools(invocations));
    }
    if text.trim().is_empty() {
        return Err(OracleError::InvalidResponse("neither tool_use nor text".to_string()));
    }
    Ok(OracleDecision::FinalAnswer(text))
}
