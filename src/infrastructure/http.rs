//! Shared plumbing for the workflow server's JSON endpoints.

use anyhow::{Context, Result};
use std::time::Duration;

pub fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to create HTTP client")
}

/// Body of a successful response; non-2xx becomes an error carrying the server's message.
pub async fn response_body(response: reqwest::Response) -> Result<String, String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("Failed to read response: {}", e))?;

    if !status.is_success() {
        return Err(match server_error(&body) {
            Some(message) => format!("HTTP {}: {}", status, message),
            None => format!("HTTP {}: {}", status, body.trim()),
        });
    }
    Ok(body)
}

/// `{success: false, error}` acknowledgements are failures even on HTTP 200.
/// Empty or non-JSON bodies count as acknowledged.
pub fn check_ack(body: &str) -> Result<(), String> {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return Ok(());
    };
    if json.get("success").and_then(|s| s.as_bool()) == Some(false) {
        return Err(server_error(body).unwrap_or_else(|| "Request reported failure".to_string()));
    }
    Ok(())
}

/// Stricter `check_ack` for deliveries: the body must be a JSON acknowledgement.
pub fn require_ack(body: &str) -> Result<(), String> {
    if serde_json::from_str::<serde_json::Value>(body).is_err() {
        let shown = body.trim();
        return Err(if shown.is_empty() {
            "Empty acknowledgement".to_string()
        } else {
            format!("Unrecognised acknowledgement: {}", shown)
        });
    }
    check_ack(body)
}

fn server_error(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json.get("error")
        .or_else(|| json.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}
