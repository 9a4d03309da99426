//! Structured-output LLM calls (single and batch) and arXiv paper downloads.
//!
//! ```text
//! caller ─▶ Agent ─▶ LlmBackend ─▶ OpenAiBackend ─▶ Responses / Files / Batches API
//!                              └─▶ EchoBackend (in memory)
//! caller ─▶ PaperFetcher ─▶ arxiv.org/pdf/<id> ─▶ <data_root>/<id>.pdf
//! ```
//!
//! Configuration is read once by [`setup::init`] (or [`Config::load`]) and handed to
//! constructors; nothing below reads the environment.

pub mod agent;
pub mod backend;
pub mod config;
pub mod conversation;
pub mod error;
pub mod fetcher;
pub mod setup;

pub use agent::Agent;
pub use backend::echo::EchoBackend;
pub use backend::openai::OpenAiBackend;
pub use backend::{LlmBackend, StructuredOutput};
pub use config::Config;
pub use conversation::{Conversation, Message, Role};
pub use error::AgentError;
pub use fetcher::PaperFetcher;
