//! # Generation Client
//!
//! Provides the `Client` struct, the entry point for text generation.
//! Resolves the configured provider once and routes each request to it.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::config::GeneratorConfig;
use crate::domain::traits::Generator;
use crate::domain::types::GenerationRequest;
use crate::infrastructure::llm::providers::{self, ProviderConfig};
use crate::infrastructure::llm::{Context, Error, Provider, Response};

pub struct Client {
    http: reqwest::Client,
    provider: Provider,
    provider_config: ProviderConfig,
}

impl Client {
    /// Create a client from the generator section of the configuration
    pub fn new(config: &GeneratorConfig) -> Result<Self, Error> {
        let provider = Provider::from_str(&config.provider)
            .ok_or_else(|| Error::new(&config.provider, "Unknown provider"))?;
        let provider_config = ProviderConfig::from_generator_config(config, provider)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::new(provider.as_str(), format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            provider,
            provider_config,
        })
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Send a prepared context to the configured provider
    pub async fn chat(&self, context: Context) -> Result<Response, Error> {
        providers::chat(&self.http, self.provider, self.provider_config.clone(), context).await
    }
}

/// System prompt first, then the rendered prompt as the user turn.
fn context_for(request: &GenerationRequest) -> Context {
    let mut context = Context::new();
    if !request.system_prompt.trim().is_empty() {
        context = context.add_system_message(&request.system_prompt);
    }
    context
        .add_user_message(&request.prompt)
        .with_temperature(request.temperature)
        .with_max_tokens(request.max_tokens)
}

#[async_trait]
impl Generator for Client {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, String> {
        let response = self.chat(context_for(request)).await.map_err(|e| e.to_string())?;
        tracing::debug!(
            "Generated {} chars with {} ({} prompt + {} completion = {} tokens)",
            response.content.len(),
            response.model,
            response.usage.prompt_tokens,
            response.usage.completion_tokens,
            response.usage.total_tokens
        );
        Ok(response.content)
    }
}
