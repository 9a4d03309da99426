//! Responses API wire format shared by the single-call and batch paths.

use serde::Deserialize;
use serde_json::Value;

use crate::backend::StructuredOutput;
use crate::conversation::Conversation;
use crate::error::AgentError;

/// Request body for one structured-output call.
pub fn request_body(model: &str, conversation: &Conversation, text_format: &Value) -> Value {
    serde_json::json!({
        "model": model,
        "input": conversation,
        "text": {"format": text_format},
        "store": false,
    })
}

#[derive(Debug, Deserialize)]
struct ResponseObject {
    status: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
    error: Option<ResponseError>,
    incomplete_details: Option<IncompleteDetails>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseError {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IncompleteDetails {
    reason: Option<String>,
}

/// Extract the model's output text from a Responses API response body.
///
/// The text is the first `output_text` part of the last `message` item; reasoning and
/// tool items that precede it are skipped.
pub fn output_text(body: Value) -> Result<String, AgentError> {
    let response: ResponseObject = serde_json::from_value(body)
        .map_err(|e| AgentError::remote(format!("unexpected response shape: {e}")))?;

    if let Some(err) = response.error {
        return Err(AgentError::remote(format!(
            "{}: {}",
            err.code.as_deref().unwrap_or("error"),
            err.message.as_deref().unwrap_or("no message")
        )));
    }

    match response.status.as_deref() {
        None | Some("completed") => {}
        Some(status) => {
            let reason = response
                .incomplete_details
                .and_then(|d| d.reason)
                .map(|r| format!(" ({r})"))
                .unwrap_or_default();
            return Err(AgentError::remote(format!("response {status}{reason}")));
        }
    }

    let message = response
        .output
        .into_iter()
        .rev()
        .find(|item| item.kind == "message")
        .ok_or_else(|| AgentError::remote("response has no message output"))?;

    for part in message.content {
        match part.kind.as_str() {
            "output_text" => {
                return part
                    .text
                    .ok_or_else(|| AgentError::remote("output_text part without text"));
            }
            "refusal" => {
                return Err(AgentError::remote(format!(
                    "model refused: {}",
                    part.refusal.unwrap_or_default()
                )));
            }
            _ => {}
        }
    }

    Err(AgentError::remote("message output has no text content"))
}

/// Decode raw model output into the caller's type.
pub fn decode<T: StructuredOutput>(text: &str) -> Result<T, AgentError> {
    serde_json::from_str(text).map_err(|e| AgentError::Decode {
        schema: T::schema_name().into_owned(),
        message: e.to_string(),
    })
}
