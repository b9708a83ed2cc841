//! Workflow server generator
//!
//! `POST {endpoint}` with `{prompt, systemPrompt, temperature, maxTokens}`,
//! answered with `{text}` (optionally alongside `success` / `error`).

use serde::{Deserialize, Serialize};

use super::ProviderConfig;
use crate::infrastructure::llm::{Context, Error, MessageRole, Response, TokenUsage};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateTextRequest<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_prompt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GenerateTextResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub async fn generate(
    http: &reqwest::Client,
    config: ProviderConfig,
    context: Context,
) -> Result<Response, Error> {
    let url = config
        .base_url
        .clone()
        .ok_or_else(|| Error::new("workflow", "No endpoint configured"))?;

    let model = context
        .model
        .as_deref()
        .or(Some(config.default_model.as_str()).filter(|m| !m.is_empty()));
    let request = GenerateTextRequest {
        prompt: context.first(MessageRole::User).unwrap_or_default(),
        system_prompt: context.first(MessageRole::System).filter(|s| !s.is_empty()),
        temperature: context.temperature,
        max_tokens: context.max_tokens,
        model,
    };

    let mut builder = http.post(&url).json(&request);
    if !config.api_key.is_empty() {
        builder = builder.bearer_auth(&config.api_key);
    }

    let response = builder
        .send()
        .await
        .map_err(|e| Error::new("workflow", format!("HTTP request failed: {}", e)))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::new("workflow", format!("Failed to read response: {}", e)))?;

    if !status.is_success() {
        return Err(Error::new("workflow", format!("HTTP {}: {}", status, body)));
    }

    Ok(Response {
        content: parse_text(&body)?,
        model: model.unwrap_or("workflow").to_string(),
        usage: TokenUsage::default(),
    })
}

fn parse_text(body: &str) -> Result<String, Error> {
    let parsed: GenerateTextResponse = serde_json::from_str(body)
        .map_err(|e| Error::new("workflow", format!("Failed to parse response: {}", e)))?;

    if parsed.success == Some(false) {
        return Err(Error::new(
            "workflow",
            parsed.error.unwrap_or_else(|| "Generation reported failure".to_string()),
        ));
    }

    parsed
        .text
        .ok_or_else(|| Error::new("workflow", "Response has no text"))
}
