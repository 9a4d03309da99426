use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::AgentError;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-5.1";
/// Batch jobs default to a smaller model than single calls.
pub const DEFAULT_BATCH_MODEL: &str = "gpt-5-mini";
pub const DEFAULT_DATA_ROOT: &str = "data";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Config file looked up in the working directory when `PAPER_AGENT_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "paper-agent.toml";

/// Process-wide settings, resolved once at startup and passed into constructors.
#[derive(Clone, PartialEq)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    /// Directory downloaded papers are written to.
    pub data_root: PathBuf,
    pub model: String,
    pub batch_model: String,
    pub poll_interval: Duration,
    /// `None` polls a batch until it reaches a terminal state.
    pub max_batch_wait: Option<Duration>,
    pub download_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            data_root: PathBuf::from(DEFAULT_DATA_ROOT),
            model: DEFAULT_MODEL.to_string(),
            batch_model: DEFAULT_BATCH_MODEL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_batch_wait: None,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("openai_base_url", &self.openai_base_url)
            .field("data_root", &self.data_root)
            .field("model", &self.model)
            .field("batch_model", &self.batch_model)
            .field("poll_interval", &self.poll_interval)
            .field("max_batch_wait", &self.max_batch_wait)
            .field("download_timeout", &self.download_timeout)
            .finish()
    }
}

/// Optional overrides read from the TOML config file. The API key is env-only.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub openai_base_url: Option<String>,
    pub data_root: Option<PathBuf>,
    pub model: Option<String>,
    pub batch_model: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub max_batch_wait_secs: Option<u64>,
    pub download_timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self, AgentError> {
        toml::from_str(text).map_err(|e| AgentError::Config(format!("invalid config file: {e}")))
    }

    /// Read `path` if it exists. A missing file is not an error.
    pub fn read(path: &Path) -> Result<Option<Self>, AgentError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AgentError::io(path, e)),
        }
    }
}

impl Config {
    /// Load `.env`, then layer defaults < config file < environment.
    pub fn load() -> Result<Self, AgentError> {
        dotenvy::dotenv().ok();

        let path = env::var_os("PAPER_AGENT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let mut config = Self::default();
        if let Some(file) = FileConfig::read(&path)? {
            tracing::info!(path = %path.display(), "loaded config file");
            config.apply_file(file);
        }
        config.apply_env(|key| env::var(key).ok());
        config.log_summary();
        Ok(config)
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        config.apply_env(lookup);
        config
    }

    pub fn apply_file(&mut self, file: FileConfig) {
        if let Some(url) = file.openai_base_url {
            self.openai_base_url = url;
        }
        if let Some(root) = file.data_root {
            self.data_root = root;
        }
        if let Some(model) = file.model {
            self.model = model;
        }
        if let Some(model) = file.batch_model {
            self.batch_model = model;
        }
        if let Some(ms) = file.poll_interval_ms {
            self.poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = file.max_batch_wait_secs {
            self.max_batch_wait = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = file.download_timeout_secs {
            self.download_timeout = Duration::from_secs(secs);
        }
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("OPENAI_API_KEY") {
            self.openai_api_key = Some(key);
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            self.openai_base_url = url;
        }
        if let Some(root) = get("PAPER_AGENT_DATA_ROOT") {
            self.data_root = PathBuf::from(root);
        }
        if let Some(model) = get("PAPER_AGENT_MODEL") {
            self.model = model;
        }
        if let Some(model) = get("PAPER_AGENT_BATCH_MODEL") {
            self.batch_model = model;
        }
        if let Some(ms) = parse_number(&get, "PAPER_AGENT_POLL_INTERVAL_MS") {
            self.poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_number(&get, "PAPER_AGENT_MAX_BATCH_WAIT_SECS") {
            self.max_batch_wait = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_number(&get, "PAPER_AGENT_DOWNLOAD_TIMEOUT_SECS") {
            self.download_timeout = Duration::from_secs(secs);
        }
    }

    fn log_summary(&self) {
        if self.openai_api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY not set, remote backend unavailable");
        }
        tracing::info!(
            model = self.model,
            batch_model = self.batch_model,
            data_root = %self.data_root.display(),
            "configuration loaded"
        );
    }
}

fn parse_number(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = get(key)?;
    match raw.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(key = key, value = raw, "ignoring non-numeric setting");
            None
        }
    }
}
