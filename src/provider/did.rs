// src/provider/did.rs — D-ID talks/streams API client

use async_trait::async_trait;
use base64::Engine;
use serde::de::DeserializeOwned;

use super::{CreateStreamRequest, Credits, StreamSession, StreamingApi, TalkScript};
use crate::infra::config::{Config, DEFAULT_DID_URL};
use crate::infra::errors::AgentError;
use crate::session::transport::{IceCandidate, SessionDescription};

const SERVICE: &str = "D-ID";

pub struct DidClient {
    api_key: Option<String>,
    client: reqwest::Client,
    base_url: String,
}

impl DidClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_DID_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let key: String = api_key.into();
        Self {
            api_key: Some(key).filter(|k| !k.trim().is_empty()),
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::with_base_url(config.key.clone().unwrap_or_default(), config.did_url.clone())
    }

    fn auth_header(&self) -> Result<String, AgentError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AgentError::missing("D-ID key"))?;
        Ok(basic_auth(key))
    }

    fn streams_url(&self, suffix: &str) -> String {
        format!("{}/talks/streams{}", self.base_url, suffix)
    }

    /// Send a request and fail on transport errors or non-2xx statuses.
    /// Bodies go through `.json()`, which sets the single `Content-Type`.
    async fn execute(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, AgentError> {
        let auth = self.auth_header()?;
        let response = builder
            .header("Authorization", auth)
            .send()
            .await
            .map_err(|e| AgentError::provider(SERVICE, None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::provider(
                SERVICE,
                Some(status.as_u16()),
                format!("HTTP {}: {}", status, body),
            ));
        }
        Ok(response)
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, AgentError> {
        response
            .json()
            .await
            .map_err(|e| AgentError::provider(SERVICE, None, format!("Failed to parse response: {}", e)))
    }
}

/// `Basic base64(key + ":")`: the key is the username, the password is empty.
pub fn basic_auth(api_key: &str) -> String {
    let token = base64::engine::general_purpose::STANDARD.encode(format!("{api_key}:"));
    format!("Basic {token}")
}

/// Body of a talk request.
pub fn talk_body(session_id: &str, script: &TalkScript) -> serde_json::Value {
    serde_json::json!({
        "script": {
            "type": "text",
            "input": script.input,
            "provider": {
                "type": "microsoft",
                "voice_id": script.voice_id,
            },
        },
        "config": { "fluent": true, "stitch": true },
        "driver_url": script.driver_url,
        "session_id": session_id,
    })
}

#[async_trait]
impl StreamingApi for DidClient {
    fn ensure_credentials(&self) -> Result<(), AgentError> {
        self.auth_header().map(|_| ())
    }

    async fn create_stream(&self, request: &CreateStreamRequest) -> Result<StreamSession, AgentError> {
        let response = self
            .execute(self.client.post(self.streams_url("")).json(request))
            .await?;
        let session: StreamSession = Self::parse(response).await?;
        tracing::debug!(stream_id = %session.id, "stream created");
        Ok(session)
    }

    async fn send_sdp_answer(
        &self,
        stream_id: &str,
        session_id: &str,
        answer: &SessionDescription,
    ) -> Result<(), AgentError> {
        let body = serde_json::json!({
            "answer": answer,
            "session_id": session_id,
        });
        self.execute(
            self.client
                .post(self.streams_url(&format!("/{stream_id}/sdp")))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn send_ice_candidate(
        &self,
        stream_id: &str,
        session_id: &str,
        candidate: &IceCandidate,
    ) -> Result<(), AgentError> {
        let body = serde_json::json!({
            "candidate": candidate.candidate,
            "sdpMid": candidate.sdp_mid,
            "sdpMLineIndex": candidate.sdp_mline_index,
            "session_id": session_id,
        });
        self.execute(
            self.client
                .post(self.streams_url(&format!("/{stream_id}/ice")))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn talk(&self, stream_id: &str, session_id: &str, script: &TalkScript) -> Result<(), AgentError> {
        let response = self
            .execute(
                self.client
                    .post(self.streams_url(&format!("/{stream_id}")))
                    .json(&talk_body(session_id, script)),
            )
            .await?;
        let ack = response.text().await.unwrap_or_default();
        tracing::debug!("talk accepted: {}", ack);
        Ok(())
    }

    async fn delete_stream(&self, stream_id: &str, session_id: &str) -> Result<(), AgentError> {
        let body = serde_json::json!({ "session_id": session_id });
        self.execute(
            self.client
                .delete(self.streams_url(&format!("/{stream_id}")))
                .json(&body),
        )
        .await?;
        tracing::debug!(stream_id, "stream deleted");
        Ok(())
    }

    async fn credits(&self) -> Result<Credits, AgentError> {
        let response = self
            .execute(
                self.client
                    .get(format!("{}/credits", self.base_url))
                    .header("accept", "application/json"),
            )
            .await?;
        Self::parse(response).await
    }
}
