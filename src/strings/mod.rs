//! # Strings Module
//!
//! Centralizes status strings and prompt templates.
//! Ensures consistency in operator-facing messaging.

pub mod logs;
pub mod prompts;
