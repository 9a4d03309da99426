use std::sync::Mutex;

use crate::backend::{LlmBackend, StructuredOutput, batch, responses};
use crate::conversation::Conversation;
use crate::error::AgentError;

/// In-memory backend that answers every conversation with `{"text": <contents>}`.
///
/// The output goes through the same decode path as provider output, so the target
/// type needs a `text: String` field. Batch calls complete in reverse order and are
/// put back in input order by sequence tag, like provider output.
#[derive(Debug, Default)]
pub struct EchoBackend {
    calls: Mutex<Vec<EchoCall>>,
}

/// One recorded call: which operation, which model, how many conversations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoCall {
    pub batch: bool,
    pub model: String,
    pub conversations: usize,
}

impl EchoBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<EchoCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, batch: bool, model: &str, conversations: usize) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(EchoCall {
                batch,
                model: model.to_string(),
                conversations,
            });
        }
    }

    fn answer(conversation: &Conversation) -> String {
        serde_json::json!({ "text": conversation.text() }).to_string()
    }
}

impl LlmBackend for EchoBackend {
    async fn parse<T: StructuredOutput>(
        &self,
        model: &str,
        conversation: &Conversation,
    ) -> Result<T, AgentError> {
        self.record(false, model, 1);
        responses::decode(&Self::answer(conversation))
    }

    async fn batch_parse<T: StructuredOutput>(
        &self,
        model: &str,
        conversations: &[Conversation],
    ) -> Result<Vec<T>, AgentError> {
        self.record(true, model, conversations.len());

        let completed = conversations
            .iter()
            .enumerate()
            .rev()
            .map(|(i, conversation)| (batch::sequence_tag(i), Self::answer(conversation)));

        batch::restore_order(completed, conversations.len())?
            .iter()
            .map(|text| responses::decode(text.as_str()))
            .collect()
    }
}
