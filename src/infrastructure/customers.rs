//! # Customer Sources
//!
//! Loads the recipient list, either from the workflow server's customer endpoint
//! or from a local JSON file with the same payload shape.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::domain::traits::CustomerSource;
use crate::domain::types::{Customer, CustomerListPayload};
use crate::infrastructure::http::response_body;

pub struct HttpCustomerSource {
    http: reqwest::Client,
    url: String,
}

impl HttpCustomerSource {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl CustomerSource for HttpCustomerSource {
    async fn fetch(&self) -> Result<Vec<Customer>, String> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))?;
        let body = response_body(response).await?;
        parse_customer_list(&body)
    }
}

/// Reads `{success, customers}` or a bare customer array from disk.
pub struct FileCustomerSource {
    path: PathBuf,
}

impl FileCustomerSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CustomerSource for FileCustomerSource {
    async fn fetch(&self) -> Result<Vec<Customer>, String> {
        let body = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| format!("Failed to read {}: {}", self.path.display(), e))?;

        if body.trim_start().starts_with('[') {
            return serde_json::from_str(&body)
                .map_err(|e| format!("Malformed customer list: {}", e));
        }
        parse_customer_list(&body)
    }
}

/// Validates the list payload. Order is preserved as served.
pub fn parse_customer_list(body: &str) -> Result<Vec<Customer>, String> {
    let payload: CustomerListPayload =
        serde_json::from_str(body).map_err(|e| format!("Malformed customer list: {}", e))?;

    if !payload.success {
        return Err("Customer source reported success: false".to_string());
    }
    payload
        .customers
        .ok_or_else(|| "Customer list payload has no `customers` field".to_string())
}
