//! # Message Composer
//!
//! Turns a customer record into a generation request and asks the generator for the message body.

use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::config::MessageConfig;
use crate::domain::error::{DispatchError, DispatchResult};
use crate::domain::traits::Generator;
use crate::domain::types::{Customer, GenerationRequest};
use crate::strings::prompts::PromptRenderer;

pub struct MessageComposer {
    config: MessageConfig,
    label_pattern: Option<Regex>,
    generator: Arc<dyn Generator>,
    timeout: Duration,
}

impl MessageComposer {
    pub fn new(config: MessageConfig, generator: Arc<dyn Generator>, timeout: Duration) -> Self {
        let label_pattern = label_regex(&config.label);
        Self {
            config,
            label_pattern,
            generator,
            timeout,
        }
    }

    /// Pulls the labelled attribute out of `context`; the raw context when the label is absent.
    pub fn extract_attribute(&self, context: &str) -> String {
        self.label_pattern
            .as_ref()
            .and_then(|re| re.captures(context))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| context.trim().to_string())
    }

    /// Never fails, whatever shape `context` has.
    pub fn build(&self, customer: &Customer) -> GenerationRequest {
        let attribute = self.extract_attribute(&customer.context);
        let prompt = PromptRenderer::new(&self.config.template)
            .set("{{NAME}}", customer.name.trim())
            .set("{{ATTRIBUTE}}", attribute)
            .set("{{CONTEXT}}", customer.context.trim())
            .render();

        GenerationRequest {
            prompt,
            system_prompt: self.config.system_prompt.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    /// Build the request and run it through the generator, bounded by the configured timeout.
    pub async fn compose(&self, customer: &Customer) -> DispatchResult<String> {
        let request = self.build(customer);
        tracing::debug!("Generation prompt for {}: {}", customer.id, request.prompt);

        let text = match tokio::time::timeout(self.timeout, self.generator.generate(&request)).await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(DispatchError::GenerationFailed(e)),
            Err(_) => {
                return Err(DispatchError::GenerationFailed(format!(
                    "timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        let text = text.trim();
        if text.is_empty() {
            return Err(DispatchError::GenerationFailed(
                "generator returned empty text".to_string(),
            ));
        }
        Ok(text.to_string())
    }
}

/// `<label>: <value>` at the start of the context or after a `;` / newline separator.
fn label_regex(label: &str) -> Option<Regex> {
    let label = label.trim();
    if label.is_empty() {
        return None;
    }
    let pattern = format!(
        r"(?i)(?:^|[;\n])\s*{}\s*[:：]\s*([^;\n]*)",
        regex::escape(label)
    );
    Regex::new(&pattern).ok()
}
