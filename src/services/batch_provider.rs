mod gemini;
pub(crate) mod states;

use async_trait::async_trait;
use serde_json::Value;

use crate::services::content::{GenerationOutput, GenerationRequest};
use crate::services::remote_error::RemoteError;

pub(crate) use gemini::GeminiBatchProvider;

/// One request of a batch, keyed by page id.
#[derive(Debug, Clone)]
pub(crate) struct ProviderRequest {
    pub(crate) key: String,
    pub(crate) request: GenerationRequest,
}

#[derive(Debug, Clone)]
pub(crate) struct RemoteJobHandle {
    pub(crate) remote_ref: String,
    pub(crate) state: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) enum ResultLocation {
    File(String),
    Inline(Vec<ResultItem>),
}

#[derive(Debug, Clone)]
pub(crate) struct PollOutcome {
    /// Raw provider state string, mapped through [`states::canonical_status`].
    pub(crate) state: String,
    pub(crate) results: Option<ResultLocation>,
    pub(crate) error: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct ResultItem {
    pub(crate) key: String,
    pub(crate) outcome: Result<GenerationOutput, String>,
}

/// Remote asynchronous batch-inference provider.
#[async_trait]
pub(crate) trait BatchProvider: Send + Sync {
    fn model(&self) -> &str;

    /// Uploads the requests as a temporary input artifact and returns its name.
    async fn upload(
        &self,
        display_name: &str,
        requests: &[ProviderRequest],
    ) -> Result<String, RemoteError>;

    async fn create_job(
        &self,
        display_name: &str,
        input_artifact: &str,
    ) -> Result<RemoteJobHandle, RemoteError>;

    async fn poll(&self, remote_ref: &str) -> Result<PollOutcome, RemoteError>;

    async fn fetch_results(&self, location: &str) -> Result<Vec<ResultItem>, RemoteError>;

    async fn delete_temp(&self, artifact: &str) -> Result<(), RemoteError>;

    async fn cancel(&self, remote_ref: &str) -> Result<(), RemoteError>;
}

/// Parses one result entry, from a JSONL line or an inline response list.
/// The key is read from `key` or `metadata.key`.
pub(crate) fn parse_result_entry(entry: &Value) -> Option<ResultItem> {
    let key = entry
        .get("key")
        .and_then(Value::as_str)
        .or_else(|| entry.get("metadata").and_then(|meta| meta.get("key")).and_then(Value::as_str))?
        .to_string();

    if let Some(error) = entry.get("error").filter(|error| !error.is_null()) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .unwrap_or_else(|| error.to_string());
        return Some(ResultItem { key, outcome: Err(message) });
    }

    let outcome = match entry.get("response") {
        Some(response) => crate::services::gemini::parse_response(response),
        None => Err("result entry has neither response nor error".to_string()),
    };

    Some(ResultItem { key, outcome })
}

/// Entries without a key cannot be mapped back to a page and are dropped.
pub(crate) fn parse_jsonl_results(body: &str) -> Result<Vec<ResultItem>, RemoteError> {
    let mut items = Vec::new();
    for (index, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let entry: Value = serde_json::from_str(line)
            .map_err(|err| RemoteError::Decode(format!("result line {}: {err}", index + 1)))?;
        match parse_result_entry(&entry) {
            Some(item) => items.push(item),
            None => tracing::warn!(line = index + 1, "Batch result line has no key; skipping"),
        }
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsonl_and_inline_entries_parse_the_same_way() {
        let jsonl = concat!(
            r#"{"key":"p1","response":{"candidates":[{"content":{"parts":[{"text":"one"}]}}]}}"#,
            "\n\n",
            r#"{"key":"p2","error":{"code":400,"message":"bad image"}}"#,
            "\n",
        );
        let from_file = parse_jsonl_results(jsonl).expect("jsonl");

        let inline = serde_json::json!({
            "metadata": { "key": "p1" },
            "response": { "candidates": [{ "content": { "parts": [{ "text": "one" }] } }] }
        });
        let from_inline = parse_result_entry(&inline).expect("inline");

        assert_eq!(from_file.len(), 2);
        assert_eq!(from_file[0].key, from_inline.key);
        assert_eq!(from_file[0].outcome, from_inline.outcome);
        assert_eq!(from_file[1].outcome, Err("bad image".to_string()));
    }

    #[test]
    fn malformed_line_is_a_decode_error() {
        let err = parse_jsonl_results("{not json").expect_err("decode");
        assert!(matches!(err, RemoteError::Decode(_)));
    }
}
