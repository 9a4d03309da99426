//! Batch protocol: request envelopes, job status and output records.
//!
//! Transport lives in [`crate::backend::openai`]; everything here is pure so the
//! lifecycle's encode/decode steps can be checked without a provider.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::responses;
use crate::conversation::Conversation;
use crate::error::AgentError;

pub const TAG_PREFIX: &str = "parse_";

/// Endpoint every envelope targets, and the batch is created against.
pub const RESPONSES_ENDPOINT: &str = "/v1/responses";

pub const COMPLETION_WINDOW: &str = "24h";

pub fn sequence_tag(index: usize) -> String {
    format!("{TAG_PREFIX}{index}")
}

/// Numeric position encoded in a sequence tag.
pub fn tag_index(tag: &str) -> Option<usize> {
    let digits = tag.strip_prefix(TAG_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[derive(Debug, Serialize)]
pub struct Envelope {
    pub custom_id: String,
    pub method: &'static str,
    pub url: &'static str,
    pub body: Value,
}

pub fn envelopes(model: &str, conversations: &[Conversation], text_format: &Value) -> Vec<Envelope> {
    conversations
        .iter()
        .enumerate()
        .map(|(i, conversation)| Envelope {
            custom_id: sequence_tag(i),
            method: "POST",
            url: RESPONSES_ENDPOINT,
            body: responses::request_body(model, conversation, text_format),
        })
        .collect()
}

/// Encode envelopes as the newline-delimited JSON upload payload.
pub fn encode_jsonl(envelopes: &[Envelope]) -> Result<String, AgentError> {
    let mut payload = String::new();
    for envelope in envelopes {
        let line = serde_json::to_string(envelope).map_err(|e| {
            AgentError::remote(format!("failed to encode {}: {e}", envelope.custom_id))
        })?;
        payload.push_str(&line);
        payload.push('\n');
    }
    Ok(payload)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    InProgress,
    Completed,
    Failed,
}

/// Batch object as returned by create/retrieve.
#[derive(Debug, Deserialize)]
pub struct BatchJob {
    pub id: String,
    pub status: String,
    pub output_file_id: Option<String>,
    pub error_file_id: Option<String>,
    pub errors: Option<BatchErrors>,
}

#[derive(Debug, Deserialize)]
pub struct BatchErrors {
    #[serde(default)]
    pub data: Vec<BatchErrorEntry>,
}

#[derive(Debug, Deserialize)]
pub struct BatchErrorEntry {
    pub code: Option<String>,
    pub message: Option<String>,
    pub line: Option<u64>,
}

impl BatchJob {
    /// Only `completed` and `failed` are terminal; every other status keeps polling.
    pub fn state(&self) -> JobState {
        match self.status.as_str() {
            "completed" => JobState::Completed,
            "failed" => JobState::Failed,
            _ => JobState::InProgress,
        }
    }

    pub fn error_detail(&self) -> String {
        let entries = self.errors.as_ref().map(|e| e.data.as_slice()).unwrap_or_default();
        if entries.is_empty() {
            return "no error detail reported".to_string();
        }
        entries
            .iter()
            .map(|entry| {
                let mut text = entry.message.as_deref().unwrap_or("unknown error").to_string();
                if let Some(code) = &entry.code {
                    text = format!("{code}: {text}");
                }
                if let Some(line) = entry.line {
                    text.push_str(&format!(" (line {line})"));
                }
                text
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// One line of a batch output file.
#[derive(Debug, Deserialize)]
pub struct OutputRecord {
    pub custom_id: String,
    pub response: Option<RecordResponse>,
    pub error: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RecordResponse {
    pub status_code: u16,
    pub body: Value,
}

impl OutputRecord {
    /// Raw model output text for this record.
    pub fn into_text(self) -> Result<String, AgentError> {
        if let Some(error) = self.error.filter(|e| !e.is_null()) {
            return Err(AgentError::remote(format!(
                "{}: {}",
                self.custom_id,
                error_message(&error)
            )));
        }
        let response = self
            .response
            .ok_or_else(|| AgentError::remote(format!("{}: record has no response", self.custom_id)))?;
        if !(200..300).contains(&response.status_code) {
            return Err(AgentError::RemoteCall {
                message: format!("{}: {}", self.custom_id, error_message(&response.body)),
                status: Some(response.status_code),
            });
        }
        responses::output_text(response.body).map_err(|e| match e {
            AgentError::RemoteCall { message, status } => AgentError::RemoteCall {
                message: format!("{}: {message}", self.custom_id),
                status,
            },
            other => other,
        })
    }
}

fn error_message(value: &Value) -> String {
    value["error"]["message"]
        .as_str()
        .or_else(|| value["message"].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

/// Parse the non-empty lines of a downloaded output or error file.
pub fn parse_records(raw: &str) -> Result<Vec<OutputRecord>, AgentError> {
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str::<OutputRecord>(line)
                .map_err(|e| AgentError::MalformedBatchOutput(format!("unparseable record: {e}")))
        })
        .collect()
}

/// Records in input order, one per request.
pub fn order_records(
    records: Vec<OutputRecord>,
    expected: usize,
) -> Result<Vec<OutputRecord>, AgentError> {
    restore_order(
        records.into_iter().map(|r| (r.custom_id.clone(), r)),
        expected,
    )
}

/// Put tagged items back into input order by the numeric tag suffix.
///
/// Fails unless every index in `0..expected` appears exactly once.
pub fn restore_order<R>(
    tagged: impl IntoIterator<Item = (String, R)>,
    expected: usize,
) -> Result<Vec<R>, AgentError> {
    let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(expected).collect();

    for (tag, item) in tagged {
        let index = tag_index(&tag)
            .ok_or_else(|| AgentError::MalformedBatchOutput(format!("unrecognized tag '{tag}'")))?;
        let slot = slots.get_mut(index).ok_or_else(|| {
            AgentError::MalformedBatchOutput(format!("tag '{tag}' outside batch of {expected}"))
        })?;
        if slot.replace(item).is_some() {
            return Err(AgentError::MalformedBatchOutput(format!("duplicate tag '{tag}'")));
        }
    }

    let missing: Vec<String> = slots
        .iter()
        .enumerate()
        .filter(|(_, slot)| slot.is_none())
        .map(|(i, _)| sequence_tag(i))
        .collect();
    if !missing.is_empty() {
        return Err(AgentError::MalformedBatchOutput(format!(
            "missing records: {}",
            missing.join(", ")
        )));
    }

    Ok(slots.into_iter().flatten().collect())
}
