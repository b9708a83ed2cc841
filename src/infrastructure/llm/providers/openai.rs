//! OpenAI-compatible API provider
//!
//! Supports OpenAI, Groq, xAI and other OpenAI-compatible chat completion APIs

use serde::{Deserialize, Serialize};

use super::ProviderConfig;
use crate::infrastructure::llm::{Context, Error, Provider, Response, TokenUsage};

/// OpenAI API request format
#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

/// OpenAI API response format
#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// Execute a chat request using an OpenAI-compatible API
pub async fn chat(
    http: &reqwest::Client,
    provider: Provider,
    config: ProviderConfig,
    context: Context,
) -> Result<Response, Error> {
    let name = provider.as_str();
    let base_url = config
        .base_url
        .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
    let model = context.model.unwrap_or_else(|| {
        if config.default_model.is_empty() {
            "gpt-4o-mini".to_string()
        } else {
            config.default_model.clone()
        }
    });

    let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));

    let request = OpenAIRequest {
        model,
        messages: context
            .messages
            .into_iter()
            .map(|msg| OpenAIMessage {
                role: msg.role.as_str().to_string(),
                content: msg.content,
            })
            .collect(),
        temperature: context.temperature,
        max_tokens: context.max_tokens,
    };

    let response = http
        .post(&url)
        .header("Authorization", format!("Bearer {}", config.api_key))
        .header("Content-Type", "application/json")
        .json(&request)
        .send()
        .await
        .map_err(|e| Error::new(name, format!("HTTP request failed: {}", e)))?;

    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        return Err(Error::new(name, error_message(status, &error_text)));
    }

    let body = response
        .text()
        .await
        .map_err(|e| Error::new(name, format!("Failed to read response: {}", e)))?;
    parse_response(name, &body)
}

/// Prefers the API's own `error.message` over the raw body.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("HTTP {}: {}", status, body))
}

fn parse_response(name: &str, body: &str) -> Result<Response, Error> {
    let parsed: OpenAIResponse = serde_json::from_str(body)
        .map_err(|e| Error::new(name, format!("Failed to parse response: {}", e)))?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| Error::new(name, "No choices in response"))?;

    let usage = parsed
        .usage
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        })
        .unwrap_or_default();

    Ok(Response {
        content,
        model: parsed.model,
        usage,
    })
}
