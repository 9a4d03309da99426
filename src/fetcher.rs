//! arXiv paper download.
//!
//! References are either the abstract page (`https://arxiv.org/abs/<id>`) or the PDF
//! itself (`https://arxiv.org/pdf/<id>`); both normalize to the PDF URL. Downloads are
//! streamed to a hidden `.part` file next to the destination and renamed into place,
//! so a failed transfer never leaves a truncated `<id>.pdf` behind.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;

use crate::config::{Config, DEFAULT_DATA_ROOT};
use crate::error::AgentError;

pub const ARXIV_HOST: &str = "https://arxiv.org";

/// Normalize a reference against the public arXiv host.
pub fn normalize(reference: &str) -> Result<String, AgentError> {
    normalize_with(reference, &format!("{ARXIV_HOST}/abs/"), &format!("{ARXIV_HOST}/pdf/"))
}

fn normalize_with(reference: &str, abs_prefix: &str, pdf_prefix: &str) -> Result<String, AgentError> {
    let reference = reference.trim();
    let id = reference
        .strip_prefix(abs_prefix)
        .or_else(|| reference.strip_prefix(pdf_prefix))
        .map(|id| id.trim_end_matches('/'))
        .ok_or_else(|| AgentError::InvalidReference(reference.to_string()))?;

    if id.is_empty() {
        return Err(AgentError::InvalidReference(reference.to_string()));
    }
    Ok(format!("{pdf_prefix}{id}"))
}

/// Local file name for a canonical PDF URL: the last path segment plus `.pdf`.
fn file_name(pdf_url: &str) -> String {
    let segment = pdf_url.rsplit('/').next().unwrap_or(pdf_url);
    let stem = segment.strip_suffix(".pdf").unwrap_or(segment);
    format!("{stem}.pdf")
}

#[derive(Debug, Clone)]
pub struct PaperFetcher {
    client: Client,
    abs_prefix: String,
    pdf_prefix: String,
    data_root: PathBuf,
}

impl PaperFetcher {
    pub fn new(download_timeout: Duration) -> Result<Self, AgentError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(download_timeout)
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            abs_prefix: format!("{ARXIV_HOST}/abs/"),
            pdf_prefix: format!("{ARXIV_HOST}/pdf/"),
            data_root: PathBuf::from(DEFAULT_DATA_ROOT),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AgentError> {
        Ok(Self::new(config.download_timeout)?.with_data_root(&config.data_root))
    }

    /// Directory [`PaperFetcher::fetch`] saves into.
    pub fn with_data_root(mut self, data_root: impl Into<PathBuf>) -> Self {
        self.data_root = data_root.into();
        self
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Recognize and download from `host` (e.g. a mirror) instead of arxiv.org.
    pub fn with_host(mut self, host: &str) -> Self {
        let host = host.trim_end_matches('/');
        self.abs_prefix = format!("{host}/abs/");
        self.pdf_prefix = format!("{host}/pdf/");
        self
    }

    pub fn normalize(&self, reference: &str) -> Result<String, AgentError> {
        normalize_with(reference, &self.abs_prefix, &self.pdf_prefix)
    }

    /// Download the paper into the configured data root.
    pub async fn fetch(&self, reference: &str) -> Result<PathBuf, AgentError> {
        self.fetch_and_save(reference, &self.data_root).await
    }

    /// Download the paper into `dest_dir` and return the written path.
    ///
    /// An existing file with the same name is replaced.
    pub async fn fetch_and_save(&self, reference: &str, dest_dir: &Path) -> Result<PathBuf, AgentError> {
        let url = self.normalize(reference)?;
        let transfer_error = |message: String, status: Option<u16>| AgentError::Transfer {
            url: url.clone(),
            message,
            status,
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transfer_error(e.to_string(), None))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = url, status = status.as_u16(), "paper download rejected");
            return Err(transfer_error(format!("HTTP {status}"), Some(status.as_u16())));
        }

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| AgentError::io(dest_dir, e))?;

        let name = file_name(&url);
        let path = dest_dir.join(&name);
        let tmp_path = dest_dir.join(format!(".{name}.part"));

        let written = match stream_to_file(response, &tmp_path).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                return Err(match e {
                    StreamError::Body(message) => transfer_error(message, Some(status.as_u16())),
                    StreamError::Write(source) => AgentError::io(&tmp_path, source),
                });
            }
        };

        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(AgentError::io(&path, e));
        }

        tracing::info!(url = url, path = %path.display(), bytes = written, "paper downloaded");
        Ok(path)
    }
}

enum StreamError {
    Body(String),
    Write(std::io::Error),
}

async fn stream_to_file(response: reqwest::Response, path: &Path) -> Result<u64, StreamError> {
    let mut file = tokio::fs::File::create(path).await.map_err(StreamError::Write)?;
    let mut body = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| StreamError::Body(e.to_string()))?;
        file.write_all(&chunk).await.map_err(StreamError::Write)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(StreamError::Write)?;
    file.sync_all().await.map_err(StreamError::Write)?;
    Ok(written)
}
