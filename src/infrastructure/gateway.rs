//! Messaging gateway client (`send-message` endpoint).

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::traits::MessageSender;
use crate::infrastructure::http::{require_ack, response_body};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest<'a> {
    platform: &'a str,
    chat_id: &'a str,
    message: &'a str,
}

pub struct HttpSender {
    http: reqwest::Client,
    url: String,
}

impl HttpSender {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl MessageSender for HttpSender {
    async fn send(&self, platform: &str, chat_id: &str, message: &str) -> Result<(), String> {
        let request = SendMessageRequest {
            platform,
            chat_id,
            message,
        };
        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))?;
        let body = response_body(response).await?;
        require_ack(&body)
    }
}
