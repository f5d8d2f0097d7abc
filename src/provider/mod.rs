// src/provider/mod.rs — Streaming avatar provider layer

pub mod did;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::infra::errors::AgentError;
use crate::session::transport::{IceCandidate, IceServer, SessionDescription};

/// Signaling and narration calls against a talking-avatar streaming service.
#[async_trait]
pub trait StreamingApi: Send + Sync {
    /// Fails without touching the network when no credential is configured.
    fn ensure_credentials(&self) -> Result<(), AgentError>;

    async fn create_stream(&self, request: &CreateStreamRequest) -> Result<StreamSession, AgentError>;

    async fn send_sdp_answer(
        &self,
        stream_id: &str,
        session_id: &str,
        answer: &SessionDescription,
    ) -> Result<(), AgentError>;

    async fn send_ice_candidate(
        &self,
        stream_id: &str,
        session_id: &str,
        candidate: &IceCandidate,
    ) -> Result<(), AgentError>;

    async fn talk(&self, stream_id: &str, session_id: &str, script: &TalkScript) -> Result<(), AgentError>;

    async fn delete_stream(&self, stream_id: &str, session_id: &str) -> Result<(), AgentError>;

    async fn credits(&self) -> Result<Credits, AgentError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateStreamRequest {
    pub source_url: String,
    pub stream_warmup: bool,
    pub config: StreamConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamConfig {
    pub video_quality: String,
}

impl CreateStreamRequest {
    pub fn new(source_url: impl Into<String>, video_quality: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            stream_warmup: true,
            config: StreamConfig {
                video_quality: video_quality.into(),
            },
        }
    }
}

/// Response to stream creation: everything needed to answer the offer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamSession {
    pub id: String,
    pub offer: SessionDescription,
    pub ice_servers: Vec<IceServer>,
    pub session_id: String,
}

/// Text the avatar should speak.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TalkScript {
    pub input: String,
    pub voice_id: String,
    pub driver_url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Credits {
    #[serde(default)]
    pub remaining: i64,
    #[serde(default)]
    pub total: i64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
