use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid paper reference: {0}")]
    InvalidReference(String),

    #[error("transfer failed for {url}: {message}")]
    Transfer {
        url: String,
        message: String,
        status: Option<u16>,
    },

    #[error("remote call failed: {message}")]
    RemoteCall {
        message: String,
        status: Option<u16>,
    },

    #[error("batch {batch_id} failed: {detail}")]
    BatchFailed { batch_id: String, detail: String },

    #[error("batch {batch_id} still running after {waited_ms}ms")]
    BatchTimeout { batch_id: String, waited_ms: u64 },

    #[error("malformed batch output: {0}")]
    MalformedBatchOutput(String),

    #[error("failed to decode model output as {schema}: {message}")]
    Decode { schema: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AgentError {
    pub(crate) fn remote(message: impl Into<String>) -> Self {
        Self::RemoteCall {
            message: message.into(),
            status: None,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// HTTP status attached to the failure, when the failure came from an HTTP response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transfer { status, .. } | Self::RemoteCall { status, .. } => *status,
            _ => None,
        }
    }
}
