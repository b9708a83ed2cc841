//! # Prompts
//!
//! Default generation templates and the renderer that fills their placeholders.

use regex::{Captures, Regex};
use std::sync::OnceLock;

pub const DEFAULT_MESSAGE_TEMPLATE: &str = "Write a short, friendly WhatsApp message for {{NAME}}, \
who works in {{ATTRIBUTE}}. Introduce our services and how they can help a business in that industry. \
Customer notes: {{CONTEXT}}";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a courteous sales assistant. \
Reply with the message body only, no greeting placeholders, no signature, under 80 words.";

/// A builder for rendering prompts with context.
pub struct PromptRenderer<'a> {
    template: &'a str,
    replacements: Vec<(&'a str, String)>,
}

impl<'a> PromptRenderer<'a> {
    pub fn new(template: &'a str) -> Self {
        Self {
            template,
            replacements: Vec::new(),
        }
    }

    pub fn set(mut self, key: &'a str, value: impl Into<String>) -> Self {
        self.replacements.push((key, value.into()));
        self
    }

    /// Fills every placeholder in one pass; substituted values are never expanded again.
    pub fn render(self) -> String {
        let Some(re) = placeholder_regex() else {
            return self.template.to_string();
        };

        let mut unreplaced = None;
        let result = re.replace_all(self.template, |caps: &Captures| {
            let key = &caps[0];
            match self.replacements.iter().find(|(k, _)| *k == key) {
                Some((_, value)) => value.clone(),
                None => {
                    unreplaced.get_or_insert_with(|| key.to_string());
                    key.to_string()
                }
            }
        });

        if let Some(placeholder) = unreplaced {
            tracing::warn!("Unreplaced placeholder in rendered prompt: {}", placeholder);
        }

        result.into_owned()
    }
}

fn placeholder_regex() -> Option<&'static Regex> {
    static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();
    PLACEHOLDER
        .get_or_init(|| Regex::new(r"\{\{\w+\}\}").ok())
        .as_ref()
}
