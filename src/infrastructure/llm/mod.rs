//! Generation backends
//!
//! One `Client` in front of several text generation services: the workflow
//! server's `generate-text` endpoint and OpenAI-compatible chat APIs
//! (OpenAI, Groq, xAI). The client implements the domain `Generator` trait.

mod client;
pub mod providers;
mod types;

pub use client::Client;

pub use types::{Context, Error, MessageRole, Provider, Response, TokenUsage};
