// src/answer/backend.rs — Backend chat API (question → answer)
//
// Requests carry the access token as a bearer credential when one is known.
// A 401 triggers one token refresh (authenticated by the refresh_token cookie)
// and one retry of the original request.

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::AnswerSource;
use crate::infra::config::Config;
use crate::infra::errors::AgentError;

const SERVICE: &str = "backend";
const VOICE_CHAT_PATH: &str = "/api/conversation/chat-auth-voice";
const REFRESH_PATH: &str = "/api/user/refresh_token";
const REFRESH_COOKIE: &str = "refresh_token";

pub struct BackendChat {
    client: reqwest::Client,
    base_url: String,
    chat_path: String,
    tokens: Mutex<Tokens>,
}

/// The access token rides as a bearer; the refresh token as the
/// `refresh_token` cookie on the refresh call only.
#[derive(Debug, Default)]
struct Tokens {
    access: Option<String>,
    refresh: Option<String>,
}

impl BackendChat {
    pub fn new(base_url: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            chat_path: VOICE_CHAT_PATH.into(),
            tokens: Mutex::new(Tokens {
                access: access_token.filter(|t| !t.is_empty()),
                refresh: None,
            }),
        }
    }

    /// Post into an existing conversation instead of the voice endpoint.
    pub fn with_conversation(mut self, conversation_id: &str) -> Self {
        self.chat_path = format!("/api/conversation/chat-auth/{conversation_id}");
        self
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        let token: String = refresh_token.into();
        self.tokens.get_mut().refresh = Some(token).filter(|t| !t.is_empty());
        self
    }

    pub fn from_config(config: &Config) -> Result<Self, AgentError> {
        let base_url = config
            .backend_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| AgentError::Config("backend_url is not set".into()))?;
        let mut chat = Self::new(base_url, config.backend_token.clone());
        if let Some(ref refresh) = config.backend_refresh_token {
            chat = chat.with_refresh_token(refresh.clone());
        }
        Ok(match config.conversation_id.as_deref() {
            Some(id) if !id.is_empty() => chat.with_conversation(id),
            _ => chat,
        })
    }

    pub async fn access_token(&self) -> Option<String> {
        self.tokens.lock().await.access.clone()
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.tokens.lock().await.refresh.clone()
    }

    async fn post_question(
        &self,
        question: &str,
        token: Option<&str>,
    ) -> Result<reqwest::Response, AgentError> {
        let mut request = self
            .client
            .post(format!("{}{}", self.base_url, self.chat_path))
            .json(&serde_json::json!({ "question": question }));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request
            .send()
            .await
            .map_err(|e| AgentError::provider(SERVICE, None, e.to_string()))
    }

    /// Exchange the refresh cookie for a fresh access token. Clears both
    /// tokens when the backend does not hand one back.
    async fn refresh_access_token(&self) -> Result<String, AgentError> {
        let mut tokens = self.tokens.lock().await;
        tracing::debug!("backend access token rejected, refreshing...");
        if tokens.refresh.is_none() {
            tracing::debug!("no backend refresh token configured");
        }

        match self.request_refresh(&tokens).await {
            Ok((access, rotated)) => {
                tokens.access = Some(access.clone());
                if rotated.is_some() {
                    tokens.refresh = rotated;
                }
                tracing::info!("backend access token refreshed");
                Ok(access)
            }
            Err(e) => {
                *tokens = Tokens::default();
                Err(e)
            }
        }
    }

    /// Returns the new access token and, when the backend rotated it, the
    /// new refresh token.
    async fn request_refresh(&self, tokens: &Tokens) -> Result<(String, Option<String>), AgentError> {
        let mut request = self.client.get(format!("{}{}", self.base_url, REFRESH_PATH));
        if let Some(ref token) = tokens.access {
            request = request.bearer_auth(token);
        }
        if let Some(ref token) = tokens.refresh {
            request = request.header(reqwest::header::COOKIE, format!("{REFRESH_COOKIE}={token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| AgentError::provider(SERVICE, None, e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::provider(
                SERVICE,
                Some(status.as_u16()),
                format!("token refresh failed (HTTP {})", status),
            ));
        }
        let rotated = rotated_refresh_token(response.headers());

        let body: serde_json::Value = response.json().await.map_err(|e| {
            AgentError::provider(SERVICE, None, format!("Failed to parse refresh response: {}", e))
        })?;
        let access = body["access_token"]
            .as_str()
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AgentError::provider(SERVICE, None, "No access token received"))?;
        Ok((access, rotated))
    }
}

/// Value of a `refresh_token` cookie set by the response, if any.
fn rotated_refresh_token(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|cookie| {
            let pair = cookie.split(';').next()?.trim();
            let (name, value) = pair.split_once('=')?;
            (name == REFRESH_COOKIE && !value.is_empty()).then(|| value.to_string())
        })
}

#[async_trait]
impl AnswerSource for BackendChat {
    fn name(&self) -> &str {
        "backend"
    }

    async fn answer(&self, question: &str) -> Result<String, AgentError> {
        let token = self.access_token().await;
        let mut response = self.post_question(question, token.as_deref()).await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            let fresh = self.refresh_access_token().await?;
            response = self.post_question(question, Some(&fresh)).await?;
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::provider(
                SERVICE,
                Some(status.as_u16()),
                format!("HTTP {}: {}", status, body),
            ));
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            AgentError::provider(SERVICE, None, format!("Failed to parse response: {}", e))
        })?;
        let answer = body["answer"].as_str().map(str::trim).unwrap_or("");
        if answer.is_empty() {
            return Err(AgentError::provider(SERVICE, None, "response has no answer"));
        }
        Ok(answer.to_string())
    }
}
