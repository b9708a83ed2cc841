//! # Infrastructure Layer
//!
//! Handles interactions with external systems and services.
//! Implements the traits defined in the Domain layer (CustomerSource, Generator, MessageSender, Tracker, Clock).

pub mod clock;
pub mod customers;
pub mod gateway;
pub mod http;
pub mod llm;
pub mod tracking;
