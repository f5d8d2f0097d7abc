// src/infra/config.rs — Configuration loading (api.json)

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::infra::errors::AgentError;
use crate::infra::paths;

pub const DEFAULT_DID_URL: &str = "https://api.d-id.com";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_SOURCE_URL: &str =
    "https://raw.githubusercontent.com/jjmlovesgit/D-id_Streaming_Chatgpt/main/oracle_pic.jpg";
pub const DEFAULT_DRIVER_URL: &str = "bank://lively/";
pub const DEFAULT_VOICE_ID: &str = "en-US-JennyNeural";

/// Which service produces the answer narrated by the avatar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerSourceKind {
    #[default]
    Backend,
    Openai,
    Gemini,
}

impl std::fmt::Display for AnswerSourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnswerSourceKind::Backend => f.write_str("backend"),
            AnswerSourceKind::Openai => f.write_str("openai"),
            AnswerSourceKind::Gemini => f.write_str("gemini"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// D-ID API key.
    pub key: Option<String>,
    pub openai_key: Option<String>,
    pub gemini_key: Option<String>,

    pub did_url: String,
    pub openai_url: String,
    pub gemini_url: String,
    /// Model for the direct text-generation sources (each has its own default).
    pub model: Option<String>,

    pub voice_id: String,
    pub source_url: String,
    pub driver_url: String,
    pub video_quality: String,
    pub stream_warmup: bool,

    pub answer_source: AnswerSourceKind,
    pub backend_url: Option<String>,
    pub backend_token: Option<String>,
    /// Sent as the `refresh_token` cookie when the access token expires.
    pub backend_refresh_token: Option<String>,
    pub conversation_id: Option<String>,

    /// Forward answers to the avatar. When off, answers are only displayed.
    pub narrate: bool,
    pub poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key: None,
            openai_key: None,
            gemini_key: None,
            did_url: DEFAULT_DID_URL.into(),
            openai_url: DEFAULT_OPENAI_URL.into(),
            gemini_url: DEFAULT_GEMINI_URL.into(),
            model: None,
            voice_id: DEFAULT_VOICE_ID.into(),
            source_url: DEFAULT_SOURCE_URL.into(),
            driver_url: DEFAULT_DRIVER_URL.into(),
            video_quality: "hd".into(),
            stream_warmup: true,
            answer_source: AnswerSourceKind::Backend,
            backend_url: None,
            backend_token: None,
            backend_refresh_token: None,
            conversation_id: None,
            narrate: true,
            poll_interval_ms: 500,
        }
    }
}

impl Config {
    /// Load config from the default location, falling back to defaults plus
    /// environment overrides when no file exists.
    pub fn load() -> Result<Self, AgentError> {
        let path = paths::config_file_path();
        let mut config = if path.exists() {
            Self::read_file(&path)?
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, AgentError> {
        let mut config = Self::read_file(path)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, AgentError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, AgentError> {
        serde_json::from_str(content).map_err(|e| AgentError::Config(format!("invalid config: {e}")))
    }

    /// Environment variables win over the file for secrets.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty("DID_API_KEY") {
            self.key = Some(v);
        }
        if let Some(v) = non_empty("OPENAI_API_KEY") {
            self.openai_key = Some(v);
        }
        if let Some(v) = non_empty("GEMINI_API_KEY") {
            self.gemini_key = Some(v);
        }
        if let Some(v) = non_empty("TALKSTREAM_BACKEND_TOKEN") {
            self.backend_token = Some(v);
        }
        if let Some(v) = non_empty("TALKSTREAM_BACKEND_REFRESH_TOKEN") {
            self.backend_refresh_token = Some(v);
        }
    }

    /// Check that every key the selected flow needs is present.
    pub fn validate(&self) -> Result<(), AgentError> {
        self.provider_key()?;
        self.validate_answer_source()
    }

    /// Same as `validate` minus the provider key, for answer-only use.
    pub fn validate_answer_source(&self) -> Result<(), AgentError> {
        match self.answer_source {
            AnswerSourceKind::Backend => {
                if present(&self.backend_url).is_none() {
                    return Err(AgentError::Config(
                        "backend_url is required when answer_source is \"backend\"".into(),
                    ));
                }
            }
            AnswerSourceKind::Openai => {
                present(&self.openai_key).ok_or_else(|| AgentError::missing("OpenAI key (openai_key)"))?;
            }
            AnswerSourceKind::Gemini => {
                present(&self.gemini_key).ok_or_else(|| AgentError::missing("Gemini key (gemini_key)"))?;
            }
        }
        if self.poll_interval_ms == 0 {
            return Err(AgentError::Config("poll_interval_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn provider_key(&self) -> Result<&str, AgentError> {
        present(&self.key).ok_or_else(|| AgentError::missing("D-ID key (key)"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Show only the first four characters of a secret.
pub fn redact(value: Option<&str>) -> String {
    match value {
        None => "(not set)".into(),
        Some(v) if v.len() <= 4 => "****".into(),
        Some(v) => format!("{}****", v.chars().take(4).collect::<String>()),
    }
}
