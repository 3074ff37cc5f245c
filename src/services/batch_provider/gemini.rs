use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::time::Duration;

use super::{
    parse_jsonl_results, parse_result_entry, BatchProvider, PollOutcome, ProviderRequest,
    RemoteJobHandle, ResultItem, ResultLocation,
};
use crate::core::config::Settings;
use crate::services::gemini::{error_message, request_body, API_KEY_HEADER};
use crate::services::remote_error::RemoteError;

/// Gemini Batch API: JSONL file input, long-running batch operations.
#[derive(Debug, Clone)]
pub(crate) struct GeminiBatchProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiBatchProvider {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .timeout(settings.provider().request_timeout())
            .build()
            .context("Failed to build batch provider HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.provider().api_key.clone(),
            base_url: settings.provider().base_url.trim_end_matches('/').to_string(),
            model: settings.provider().model.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Model ids may arrive as `gemini-x` or `models/gemini-x`.
    fn model_path(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }
}

async fn ensure_success(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let raw = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&raw)
        .map(|body| error_message(&body))
        .unwrap_or_else(|_| raw.chars().take(300).collect());
    Err(RemoteError::from_status(status, message))
}

async fn read_json(response: Response) -> Result<Value, RemoteError> {
    let response = ensure_success(response).await?;
    response.json::<Value>().await.map_err(|err| RemoteError::Decode(err.to_string()))
}

/// Operations carry `metadata.state` and `response`; bare batch resources carry `state`
/// and `output`.
fn parse_operation(body: &Value) -> Result<PollOutcome, RemoteError> {
    let metadata = body.get("metadata").unwrap_or(body);
    let state = metadata
        .get("state")
        .or_else(|| body.get("state"))
        .and_then(Value::as_str)
        .ok_or_else(|| RemoteError::Decode("batch operation has no state".to_string()))?
        .to_string();

    let output = body
        .get("response")
        .or_else(|| metadata.get("output"))
        .or_else(|| body.get("output"));

    let results = output.and_then(|output| {
        if let Some(file) = output.get("responsesFile").and_then(Value::as_str) {
            return Some(ResultLocation::File(file.to_string()));
        }

        let inlined = output.get("inlinedResponses")?;
        let entries = inlined
            .get("inlinedResponses")
            .and_then(Value::as_array)
            .or_else(|| inlined.as_array())?;
        Some(ResultLocation::Inline(entries.iter().filter_map(parse_result_entry).collect()))
    });

    let error = body
        .get("error")
        .filter(|error| !error.is_null())
        .map(|error| error.get("message").and_then(Value::as_str).unwrap_or("batch failed"))
        .map(ToString::to_string);

    Ok(PollOutcome { state, results, error })
}

#[async_trait]
impl BatchProvider for GeminiBatchProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn upload(
        &self,
        display_name: &str,
        requests: &[ProviderRequest],
    ) -> Result<String, RemoteError> {
        let mut payload = String::new();
        for item in requests {
            let line = json!({ "key": item.key, "request": request_body(&item.request, None) });
            payload.push_str(&line.to_string());
            payload.push('\n');
        }

        let start = self
            .client
            .post(self.url("upload/v1beta/files"))
            .header(API_KEY_HEADER, &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", payload.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", "application/jsonl")
            .json(&json!({ "file": { "display_name": display_name } }))
            .send()
            .await?;
        let start = ensure_success(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string)
            .ok_or_else(|| RemoteError::Decode("upload start returned no upload url".to_string()))?;

        let finish = self
            .client
            .post(upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(payload)
            .send()
            .await?;
        let body = read_json(finish).await?;

        body.get("file")
            .and_then(|file| file.get("name"))
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| RemoteError::Decode("upload returned no file name".to_string()))
    }

    async fn create_job(
        &self,
        display_name: &str,
        input_artifact: &str,
    ) -> Result<RemoteJobHandle, RemoteError> {
        let response = self
            .client
            .post(self.url(&format!("v1beta/{}:batchGenerateContent", self.model_path())))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&json!({
                "batch": {
                    "display_name": display_name,
                    "input_config": { "file_name": input_artifact },
                }
            }))
            .send()
            .await?;
        let body = read_json(response).await?;

        let remote_ref = body
            .get("name")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| RemoteError::Decode("batch create returned no name".to_string()))?;
        let state = parse_operation(&body).ok().map(|outcome| outcome.state);

        Ok(RemoteJobHandle { remote_ref, state })
    }

    async fn poll(&self, remote_ref: &str) -> Result<PollOutcome, RemoteError> {
        let response = self
            .client
            .get(self.url(&format!("v1beta/{remote_ref}")))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        let body = read_json(response).await?;
        parse_operation(&body)
    }

    async fn fetch_results(&self, location: &str) -> Result<Vec<ResultItem>, RemoteError> {
        let response = self
            .client
            .get(self.url(&format!("download/v1beta/{location}:download")))
            .query(&[("alt", "media")])
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        let body = ensure_success(response).await?.text().await?;
        parse_jsonl_results(&body)
    }

    async fn delete_temp(&self, artifact: &str) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(self.url(&format!("v1beta/{artifact}")))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn cancel(&self, remote_ref: &str) -> Result<(), RemoteError> {
        let response = self
            .client
            .post(self.url(&format!("v1beta/{remote_ref}:cancel")))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_with_responses_file() {
        let body = json!({
            "name": "batches/abc",
            "metadata": { "state": "BATCH_STATE_SUCCEEDED" },
            "done": true,
            "response": { "responsesFile": "files/out-1" }
        });

        let outcome = parse_operation(&body).expect("outcome");

        assert_eq!(outcome.state, "BATCH_STATE_SUCCEEDED");
        assert!(matches!(outcome.results, Some(ResultLocation::File(ref name)) if name == "files/out-1"));
    }

    #[test]
    fn batch_resource_with_inlined_responses() {
        let body = json!({
            "name": "batches/abc",
            "state": "JOB_STATE_SUCCEEDED",
            "output": { "inlinedResponses": { "inlinedResponses": [
                { "metadata": { "key": "p1" }, "error": { "message": "quota" } }
            ] } }
        });

        let outcome = parse_operation(&body).expect("outcome");

        let Some(ResultLocation::Inline(items)) = outcome.results else {
            panic!("expected inline results");
        };
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].outcome, Err("quota".to_string()));
    }

    #[test]
    fn running_operation_has_no_results() {
        let body = json!({ "name": "batches/abc", "metadata": { "state": "BATCH_STATE_RUNNING" } });
        let outcome = parse_operation(&body).expect("outcome");
        assert!(outcome.results.is_none());
        assert!(outcome.error.is_none());
    }
}
