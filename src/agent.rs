use crate::backend::openai::OpenAiBackend;
use crate::backend::{LlmBackend, StructuredOutput};
use crate::config::{Config, DEFAULT_BATCH_MODEL, DEFAULT_MODEL};
use crate::conversation::Conversation;
use crate::error::AgentError;

/// Entry point for structured LLM calls.
///
/// Binds the model names to a backend so callers never see how the backend is built.
/// Single calls use `model`; batch calls use `batch_model`, which defaults to a smaller
/// model and can be set independently.
#[derive(Debug)]
pub struct Agent<B = OpenAiBackend> {
    model: String,
    batch_model: String,
    backend: B,
}

impl Agent<OpenAiBackend> {
    /// Agent backed by the OpenAI API, with models taken from `config`.
    pub fn from_config(config: &Config) -> Result<Self, AgentError> {
        let backend = OpenAiBackend::from_config(config)?;
        Ok(Self::new(config.model.clone(), backend).with_batch_model(config.batch_model.clone()))
    }
}

impl<B: LlmBackend> Agent<B> {
    pub fn new(model: impl Into<String>, backend: B) -> Self {
        Self {
            model: model.into(),
            batch_model: DEFAULT_BATCH_MODEL.to_string(),
            backend,
        }
    }

    /// Agent on `backend` with the default single-call model.
    pub fn with_backend(backend: B) -> Self {
        Self::new(DEFAULT_MODEL, backend)
    }

    pub fn with_batch_model(mut self, batch_model: impl Into<String>) -> Self {
        self.batch_model = batch_model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn batch_model(&self) -> &str {
        &self.batch_model
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub async fn parse<T: StructuredOutput>(&self, conversation: &Conversation) -> Result<T, AgentError> {
        tracing::debug!(model = self.model, messages = conversation.len(), "parse");
        self.backend.parse(&self.model, conversation).await
    }

    pub async fn batch_parse<T: StructuredOutput>(
        &self,
        conversations: &[Conversation],
    ) -> Result<Vec<T>, AgentError> {
        tracing::debug!(
            model = self.batch_model,
            conversations = conversations.len(),
            "batch parse"
        );
        self.backend.batch_parse(&self.batch_model, conversations).await
    }
}
