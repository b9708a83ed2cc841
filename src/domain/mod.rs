//! # Domain Layer
//!
//! Core definitions, types, and traits that define the outreach domain.
//! Independent of specific transports, serving as the contract for other layers.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;
