pub mod batch;
pub mod echo;
pub mod openai;
pub mod responses;
pub mod schema;

use std::future::Future;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use crate::conversation::Conversation;
use crate::error::AgentError;

/// A type a model response can be decoded into.
///
/// The JSON schema sent to the provider is derived from the type itself.
pub trait StructuredOutput: DeserializeOwned + JsonSchema + Send {}

impl<T: DeserializeOwned + JsonSchema + Send> StructuredOutput for T {}

/// Produces values of a caller-chosen type from a conversation.
///
/// [`openai::OpenAiBackend`] talks to the provider; [`echo::EchoBackend`] answers
/// in memory for tests.
pub trait LlmBackend: Send + Sync {
    /// Send one conversation and decode the completed response.
    fn parse<T: StructuredOutput>(
        &self,
        model: &str,
        conversation: &Conversation,
    ) -> impl Future<Output = Result<T, AgentError>> + Send;

    /// Process all conversations as one job. The result has the same length and
    /// order as `conversations`, or the call fails as a whole.
    fn batch_parse<T: StructuredOutput>(
        &self,
        model: &str,
        conversations: &[Conversation],
    ) -> impl Future<Output = Result<Vec<T>, AgentError>> + Send;
}
