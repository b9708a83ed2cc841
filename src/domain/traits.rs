//! # Domain Traits
//!
//! Abstract interfaces for the dispatcher's collaborators (customer source, generator,
//! messaging gateway, tracker, status observer, clock).
//! Allows for pluggable implementations in the Infrastructure layer.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};

use crate::domain::types::{Customer, GenerationRequest, StatusLevel, TrackingRecord};

/// Supplies the ordered recipient list for a run.
#[async_trait]
pub trait CustomerSource: Send + Sync {
    /// Fails on transport errors, `success: false`, or a malformed payload.
    async fn fetch(&self) -> Result<Vec<Customer>, String>;
}

/// Opaque text-in/text-out generation service.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, String>;
}

/// Abstract interface for the outbound messaging gateway
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, platform: &str, chat_id: &str, message: &str) -> Result<(), String>;
}

/// Best-effort outcome log.
#[async_trait]
pub trait Tracker: Send + Sync {
    async fn record(&self, record: &TrackingRecord) -> Result<(), String>;
}

/// One-way progress sink. Never read back.
pub trait StatusObserver: Send + Sync {
    fn notify(&self, level: StatusLevel, message: &str);
}

/// Current time, plus the local zone recipients live in.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;

    fn offset(&self) -> FixedOffset;

    fn now_local(&self) -> DateTime<FixedOffset> {
        self.now_utc().with_timezone(&self.offset())
    }
}
