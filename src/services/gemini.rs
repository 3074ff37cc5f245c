//! Wire shape shared by the Gemini batch and generateContent endpoints.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};

use crate::db::models::TokenUsage;
use crate::services::content::{GenerationOutput, GenerationRequest, Part};

pub(crate) const API_KEY_HEADER: &str = "x-goog-api-key";

pub(crate) fn request_body(request: &GenerationRequest, max_output_tokens: Option<u32>) -> Value {
    let parts: Vec<Value> = request
        .parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => json!({ "text": text }),
            Part::InlineImage { mime_type, data } => json!({
                "inlineData": { "mimeType": mime_type, "data": STANDARD.encode(data) }
            }),
        })
        .collect();

    let mut body = json!({
        "systemInstruction": { "parts": [{ "text": request.system_instruction }] },
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": { "temperature": 0.0, "candidateCount": 1 },
    });

    if let Some(limit) = max_output_tokens {
        body["generationConfig"]["maxOutputTokens"] = json!(limit);
    }

    body
}

/// Extracts the first candidate's text. Blocked or empty responses are errors.
pub(crate) fn parse_response(body: &Value) -> Result<GenerationOutput, String> {
    if let Some(reason) = body
        .get("promptFeedback")
        .and_then(|feedback| feedback.get("blockReason"))
        .and_then(Value::as_str)
    {
        return Err(format!("prompt blocked: {reason}"));
    }

    let candidate = body
        .get("candidates")
        .and_then(|candidates| candidates.get(0))
        .ok_or_else(|| "response has no candidates".to_string())?;

    let text = candidate
        .get("content")
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate.get("finishReason").and_then(Value::as_str).unwrap_or("EMPTY");
        return Err(format!("empty output (finish reason {reason})"));
    }

    Ok(GenerationOutput {
        text: text.trim().to_string(),
        model: body.get("modelVersion").and_then(Value::as_str).map(ToString::to_string),
        usage: body.get("usageMetadata").map(parse_usage),
    })
}

fn parse_usage(usage: &Value) -> TokenUsage {
    TokenUsage {
        prompt_tokens: usage.get("promptTokenCount").and_then(Value::as_i64),
        output_tokens: usage.get("candidatesTokenCount").and_then(Value::as_i64),
        total_tokens: usage.get("totalTokenCount").and_then(Value::as_i64),
    }
}

pub(crate) fn error_message(body: &Value) -> String {
    body.get("error")
        .and_then(|error| error.get("message").and_then(Value::as_str).or_else(|| error.as_str()))
        .or_else(|| body.get("message").and_then(Value::as_str))
        .unwrap_or("unknown_error")
        .to_string()
}
