use std::time::{Duration, Instant};

use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::backend::batch::{self, BatchJob, JobState};
use crate::backend::{LlmBackend, StructuredOutput, responses, schema};
use crate::config::{Config, DEFAULT_OPENAI_BASE_URL, DEFAULT_POLL_INTERVAL};
use crate::conversation::Conversation;
use crate::error::AgentError;

/// Cap on how much of an error body ends up in an error message.
const MAX_ERROR_BODY_BYTES: usize = 4 * 1024;

const BATCH_INPUT_FILENAME: &str = "batch_input.jsonl";

/// Backend for the OpenAI Responses and Batches APIs.
///
/// Single calls block on the Responses endpoint. Batch calls upload a JSONL file,
/// create a batch job, poll it until it reaches `completed` or `failed`, then download
/// and reorder the output. Polling is unbounded unless a max wait is set.
pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    api_key: String,
    poll_interval: Duration,
    max_wait: Option<Duration>,
}

#[derive(Deserialize)]
struct FileObject {
    id: String,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("poll_interval", &self.poll_interval)
            .field("max_wait", &self.max_wait)
            .finish()
    }
}

impl OpenAiBackend {
    pub fn new(api_key: impl Into<String>) -> Result<Self, AgentError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            api_key: api_key.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AgentError> {
        let api_key = config
            .openai_api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AgentError::Config("OPENAI_API_KEY is not set".to_string()))?;

        Ok(Self::new(api_key)?
            .with_base_url(&config.openai_base_url)
            .with_poll_interval(config.poll_interval)
            .with_max_wait(config.max_batch_wait))
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Give up on a batch that is still running after `max_wait`. `None` polls forever.
    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Vec<u8>, AgentError> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AgentError::remote(format!("{what}: {e}")))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AgentError::RemoteCall {
                message: format!("{what}: failed to read response body: {e}"),
                status: Some(status.as_u16()),
            })?;

        if !status.is_success() {
            let truncated = &bytes[..bytes.len().min(MAX_ERROR_BODY_BYTES)];
            return Err(AgentError::RemoteCall {
                message: format!("{what}: HTTP {status}: {}", api_error_message(truncated)),
                status: Some(status.as_u16()),
            });
        }

        Ok(bytes.to_vec())
    }

    async fn send_json<R: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<R, AgentError> {
        let bytes = self.send(request, what).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AgentError::remote(format!("{what}: unexpected response shape: {e}")))
    }

    async fn upload_batch_input(&self, payload: String) -> Result<String, AgentError> {
        let file = Part::bytes(payload.into_bytes())
            .file_name(BATCH_INPUT_FILENAME)
            .mime_str("application/jsonl")
            .map_err(|e| AgentError::remote(format!("batch upload: {e}")))?;
        let form = Form::new().text("purpose", "batch").part("file", file);

        let uploaded: FileObject = self
            .send_json(
                self.client.post(self.url("/files")).multipart(form),
                "batch upload",
            )
            .await?;
        Ok(uploaded.id)
    }

    async fn create_batch(&self, input_file_id: &str) -> Result<BatchJob, AgentError> {
        let body = serde_json::json!({
            "input_file_id": input_file_id,
            "endpoint": batch::RESPONSES_ENDPOINT,
            "completion_window": batch::COMPLETION_WINDOW,
        });
        self.send_json(self.client.post(self.url("/batches")).json(&body), "batch create")
            .await
    }

    /// Poll until the job is `completed` or `failed`. Every other status is in progress.
    async fn wait_for_batch(&self, batch_id: &str) -> Result<BatchJob, AgentError> {
        let start = Instant::now();
        let status_url = self.url(&format!("/batches/{batch_id}"));

        loop {
            let job: BatchJob = self
                .send_json(self.client.get(&status_url), "batch status")
                .await?;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match job.state() {
                JobState::Completed => {
                    tracing::info!(batch_id = batch_id, elapsed_ms = elapsed_ms, "batch completed");
                    return Ok(job);
                }
                JobState::Failed => {
                    let detail = job.error_detail();
                    tracing::warn!(batch_id = batch_id, detail = detail, "batch failed");
                    return Err(AgentError::BatchFailed {
                        batch_id: batch_id.to_string(),
                        detail,
                    });
                }
                JobState::InProgress => {
                    tracing::debug!(
                        batch_id = batch_id,
                        status = job.status,
                        elapsed_ms = elapsed_ms,
                        "batch still in progress"
                    );
                    if self.max_wait.is_some_and(|max| start.elapsed() >= max) {
                        return Err(AgentError::BatchTimeout {
                            batch_id: batch_id.to_string(),
                            waited_ms: elapsed_ms,
                        });
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    async fn download_file(&self, file_id: &str) -> Result<String, AgentError> {
        let bytes = self
            .send(
                self.client.get(self.url(&format!("/files/{file_id}/content"))),
                "batch file download",
            )
            .await?;
        String::from_utf8(bytes).map_err(|e| {
            AgentError::MalformedBatchOutput(format!("batch file {file_id} is not UTF-8: {e}"))
        })
    }
}

impl LlmBackend for OpenAiBackend {
    async fn parse<T: StructuredOutput>(
        &self,
        model: &str,
        conversation: &Conversation,
    ) -> Result<T, AgentError> {
        let body = responses::request_body(model, conversation, &schema::text_format::<T>());
        let response: Value = self
            .send_json(self.client.post(self.url("/responses")).json(&body), "responses")
            .await?;
        let text = responses::output_text(response)?;
        responses::decode(&text)
    }

    async fn batch_parse<T: StructuredOutput>(
        &self,
        model: &str,
        conversations: &[Conversation],
    ) -> Result<Vec<T>, AgentError> {
        if conversations.is_empty() {
            return Ok(Vec::new());
        }

        let text_format = schema::text_format::<T>();
        let envelopes = batch::envelopes(model, conversations, &text_format);
        let payload = batch::encode_jsonl(&envelopes)?;

        let input_file_id = self.upload_batch_input(payload).await?;
        let job = self.create_batch(&input_file_id).await?;
        tracing::info!(
            batch_id = job.id,
            model = model,
            requests = envelopes.len(),
            "batch submitted"
        );

        let job = self.wait_for_batch(&job.id).await?;
        if job.output_file_id.is_none() && job.error_file_id.is_none() {
            return Err(AgentError::MalformedBatchOutput(format!(
                "batch {} completed without an output file",
                job.id
            )));
        }

        let mut records = match job.output_file_id.as_deref() {
            Some(file_id) => batch::parse_records(&self.download_file(file_id).await?)?,
            None => Vec::new(),
        };
        // Failed requests are written to the error file, not the output file.
        let error_file_id = job
            .error_file_id
            .as_deref()
            .filter(|_| records.len() < conversations.len());
        if let Some(file_id) = error_file_id {
            let failed = batch::parse_records(&self.download_file(file_id).await?)?;
            tracing::warn!(batch_id = job.id, failed = failed.len(), "batch reported failed requests");
            records.extend(failed);
        }

        batch::order_records(records, conversations.len())?
            .into_iter()
            .map(|record| record.into_text().and_then(|text| responses::decode(&text)))
            .collect()
    }
}

/// Pull `error.message` out of an API error body, falling back to the raw text.
fn api_error_message(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned())
}
