//! # Dispatch Errors
//!
//! Error taxonomy for a dispatch run. Only `SourceUnavailable` leaves the dispatcher;
//! `Stopped` ends a run early and the rest are converted into tracked outcomes.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("customer source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("customer list is empty")]
    EmptyList,
    #[error("generation failed: {0}")]
    GenerationFailed(String),
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("tracking write failed: {0}")]
    TrackingWriteFailed(String),
    #[error("run stopped")]
    Stopped,
}

pub type DispatchResult<T> = Result<T, DispatchError>;
