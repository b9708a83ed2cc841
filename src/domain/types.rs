//! # Domain Types
//!
//! Common data structures and enums used across the dispatch logic.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One addressable recipient. Identity is `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Customer {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub context: String,
}

impl Customer {
    pub fn new(id: impl Into<String>, name: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            context: context.into(),
        }
    }
}

/// Payload shape served by the customer list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomerListPayload {
    pub success: bool,
    #[serde(default)]
    pub customers: Option<Vec<Customer>>,
}

/// Request handed to the external generator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    GenerationFailed,
    SendFailed,
}

impl DispatchOutcome {
    pub fn status(&self) -> TrackingStatus {
        match self {
            DispatchOutcome::Sent => TrackingStatus::Sent,
            DispatchOutcome::GenerationFailed | DispatchOutcome::SendFailed => {
                TrackingStatus::Failed
            }
        }
    }
}

/// Result of one dispatch cycle. Consumed by the tracker call and dropped.
#[derive(Debug, Clone)]
pub struct DispatchAttempt {
    pub customer: Customer,
    pub generated_text: Option<String>,
    pub outcome: DispatchOutcome,
}

impl DispatchAttempt {
    pub fn into_record(self) -> TrackingRecord {
        TrackingRecord {
            status: self.outcome.status(),
            customer_id: self.customer.id,
            customer_name: self.customer.name,
            message: self.generated_text.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingStatus {
    Sent,
    Failed,
}

impl TrackingStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TrackingStatus::Sent => "sent",
            TrackingStatus::Failed => "failed",
        }
    }
}

/// Outcome log entry, emitted once per attempted recipient in dispatch order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingRecord {
    pub customer_id: String,
    pub customer_name: String,
    pub message: String,
    pub status: TrackingStatus,
}

/// Verdict of the business-hours gate for a single poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDecision {
    pub proceed: bool,
    pub wait: Option<Duration>,
}

impl GateDecision {
    pub fn proceed() -> Self {
        Self {
            proceed: true,
            wait: None,
        }
    }

    pub fn wait(duration: Duration) -> Self {
        Self {
            proceed: false,
            wait: Some(duration),
        }
    }
}

/// Severity attached to a status notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warn,
    Error,
}
