use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

use crate::core::config::Settings;
use crate::services::content::{GenerationOutput, GenerationRequest};
use crate::services::gemini::{error_message, parse_response, request_body, API_KEY_HEADER};
use crate::services::remote_error::RemoteError;

/// Synchronous per-item inference used by interactive runs.
#[async_trait]
pub(crate) trait InferenceClient: Send + Sync {
    fn model(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput, RemoteError>;
}

#[derive(Debug, Clone)]
pub(crate) struct GeminiInferenceClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_output_tokens: u32,
}

impl GeminiInferenceClient {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .timeout(settings.inference().request_timeout())
            .build()
            .context("Failed to build inference HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.inference().api_key.clone(),
            base_url: settings.inference().base_url.trim_end_matches('/').to_string(),
            model: settings.inference().model.trim_start_matches("models/").to_string(),
            max_output_tokens: settings.inference().max_output_tokens,
        })
    }
}

#[async_trait]
impl InferenceClient for GeminiInferenceClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput, RemoteError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request_body(request, Some(self.max_output_tokens)))
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await?;
        interpret_reply(status, &raw)
    }
}

/// A success status with a body that is not JSON is a garbled transfer and retryable.
/// Blocked or empty output is never retried.
fn interpret_reply(status: StatusCode, raw: &str) -> Result<GenerationOutput, RemoteError> {
    let body = serde_json::from_str::<Value>(raw);
    if !status.is_success() {
        let body = body.unwrap_or(Value::Null);
        return Err(RemoteError::from_status(status, error_message(&body)));
    }

    let body = body
        .map_err(|err| RemoteError::Transient(format!("undecodable generateContent reply: {err}")))?;
    parse_response(&body).map_err(|message| RemoteError::Client { status: 200, message })
}
