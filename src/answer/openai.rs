// src/answer/openai.rs — Direct OpenAI chat completions

use async_trait::async_trait;

use super::AnswerSource;
use crate::infra::config::{Config, DEFAULT_OPENAI_URL};
use crate::infra::errors::AgentError;

const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub struct OpenAiAnswers {
    api_key: Option<String>,
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OpenAiAnswers {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_OPENAI_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let key: String = api_key.into();
        Self {
            api_key: Some(key).filter(|k| !k.trim().is_empty()),
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.into(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn from_config(config: &Config) -> Self {
        let answers = Self::with_base_url(
            config.openai_key.clone().unwrap_or_default(),
            config.openai_url.clone(),
        );
        match config.model.as_deref() {
            Some(m) if !m.trim().is_empty() => answers.with_model(m),
            _ => answers,
        }
    }
}

#[async_trait]
impl AnswerSource for OpenAiAnswers {
    fn name(&self) -> &str {
        "openai"
    }

    async fn answer(&self, question: &str) -> Result<String, AgentError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AgentError::missing("OpenAI key"))?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": question }],
            "temperature": 0.7,
            "max_tokens": 100,
            "stream": false,
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::provider("openai", None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body: serde_json::Value = response.json().await.unwrap_or_default();
            let message = error_body["error"]["message"]
                .as_str()
                .unwrap_or("Unknown error");
            return Err(AgentError::provider(
                "openai",
                Some(status.as_u16()),
                format!("HTTP {}: {}", status, message),
            ));
        }

        let resp: serde_json::Value = response.json().await.map_err(|e| {
            AgentError::provider("openai", None, format!("Failed to parse response: {}", e))
        })?;

        resp["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AgentError::provider("openai", None, "response has no content"))
    }
}
