//! # Generation Providers
//!
//! Contains implementations for specific generation backends.
//! OpenAI-compatible services (OpenAI, Groq, xAI) share one implementation and differ only in base URL.

mod openai;
mod workflow;

use crate::domain::config::GeneratorConfig;
use crate::infrastructure::llm::{Context, Error, Provider, Response};

/// Configuration for a provider
#[derive(Clone)]
pub struct ProviderConfig {
    /// API key; empty for backends that take none
    pub api_key: String,
    /// Base URL (for non-default endpoints)
    pub base_url: Option<String>,
    /// Default model
    pub default_model: String,
}

impl ProviderConfig {
    pub fn from_generator_config(config: &GeneratorConfig, provider: Provider) -> Result<Self, Error> {
        let api_key = if let Some(key) = &config.api_key {
            key.clone()
        } else if let Some(env_var) = &config.api_key_env {
            std::env::var(env_var).map_err(|e| {
                Error::new(
                    &config.provider,
                    format!("API key env var {} not set: {}", env_var, e),
                )
            })?
        } else if provider.requires_key() {
            return Err(Error::new(
                &config.provider,
                "No API key provided - set api_key or api_key_env",
            ));
        } else {
            String::new()
        };

        if provider == Provider::Workflow && config.endpoint.is_none() {
            return Err(Error::new(
                &config.provider,
                "The workflow generator needs an endpoint",
            ));
        }

        Ok(Self {
            api_key,
            base_url: config.endpoint.clone(),
            default_model: config.model.clone(),
        })
    }

    /// Resolved base URL for the provider: an explicit endpoint wins over the provider default.
    pub fn base_url_for(&self, provider: Provider) -> Option<String> {
        if self.base_url.is_some() {
            return self.base_url.clone();
        }
        match provider {
            Provider::Groq => Some("https://api.groq.com/openai/v1".to_string()),
            Provider::XAI => Some("https://api.x.ai/v1".to_string()),
            Provider::OpenAI | Provider::Workflow => None,
        }
    }
}

/// Execute a generation request with the specified provider
pub async fn chat(
    http: &reqwest::Client,
    provider: Provider,
    config: ProviderConfig,
    context: Context,
) -> Result<Response, Error> {
    match provider {
        Provider::Workflow => workflow::generate(http, config, context).await,
        Provider::OpenAI | Provider::Groq | Provider::XAI => {
            let config_with_url = ProviderConfig {
                base_url: config.base_url_for(provider),
                ..config
            };
            openai::chat(http, provider, config_with_url, context).await
        }
    }
}
