// src/answer/gemini.rs — Direct Gemini generateContent

use async_trait::async_trait;

use super::AnswerSource;
use crate::infra::config::{Config, DEFAULT_GEMINI_URL};
use crate::infra::errors::AgentError;

const DEFAULT_MODEL: &str = "gemini-1.5-flash";

pub struct GeminiAnswers {
    api_key: Option<String>,
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl GeminiAnswers {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_GEMINI_URL)
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
            config.gemini_key.clone().unwrap_or_default(),
            config.gemini_url.clone(),
        );
        match config.model.as_deref() {
            Some(m) if !m.trim().is_empty() => answers.with_model(m),
            _ => answers,
        }
    }

    /// Build the generateContent body for a single user turn.
    fn build_request_body(question: &str) -> serde_json::Value {
        serde_json::json!({
            "contents": [{
                "parts": [{ "text": question }],
            }],
        })
    }
}

#[async_trait]
impl AnswerSource for GeminiAnswers {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn answer(&self, question: &str) -> Result<String, AgentError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AgentError::missing("Gemini key"))?;

        let response = self
            .client
            .post(format!(
                "{}/v1/models/{}:generateContent",
                self.base_url, self.model
            ))
            .query(&[("key", api_key)])
            .json(&Self::build_request_body(question))
            .send()
            .await
            .map_err(|e| AgentError::provider("gemini", None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body: serde_json::Value = response.json().await.unwrap_or_default();
            let message = error_body["error"]["message"]
                .as_str()
                .unwrap_or("Unknown error");
            return Err(AgentError::provider(
                "gemini",
                Some(status.as_u16()),
                format!("HTTP {}: {}", status, message),
            ));
        }

        let resp: serde_json::Value = response.json().await.map_err(|e| {
            AgentError::provider("gemini", None, format!("Failed to parse response: {}", e))
        })?;

        resp["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AgentError::provider("gemini", None, "No response from Gemini."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body() {
        let body = GeminiAnswers::build_request_body("hello");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_request() {
        let answers = GeminiAnswers::with_base_url("", "http://127.0.0.1:9");
        assert!(matches!(
            answers.answer("hi").await,
            Err(AgentError::MissingCredential { .. })
        ));
    }
}
