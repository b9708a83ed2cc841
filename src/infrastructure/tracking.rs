//! # Outcome Tracking
//!
//! Tracker implementations: an HTTP endpoint receiving each record as JSON,
//! or a local JSON Lines file with one record per attempt.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use crate::domain::traits::Tracker;
use crate::domain::types::TrackingRecord;
use crate::infrastructure::http::{check_ack, response_body};

pub struct HttpTracker {
    http: reqwest::Client,
    url: String,
}

impl HttpTracker {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Tracker for HttpTracker {
    async fn record(&self, record: &TrackingRecord) -> Result<(), String> {
        let response = self
            .http
            .post(&self.url)
            .json(record)
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))?;
        let body = response_body(response).await?;
        check_ack(&body)
    }
}

pub struct JsonlTracker {
    path: PathBuf,
}

impl JsonlTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Tracker for JsonlTracker {
    async fn record(&self, record: &TrackingRecord) -> Result<(), String> {
        let mut line = serde_json::to_string(record).map_err(|e| e.to_string())?;
        line.push('\n');

        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| format!("Failed to create {}: {}", dir.display(), e))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| format!("Failed to open {}: {}", self.path.display(), e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| format!("Failed to write {}: {}", self.path.display(), e))?;
        file.flush().await.map_err(|e| e.to_string())
    }
}
