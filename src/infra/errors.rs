// src/infra/errors.rs — Error types for talkstream

use thiserror::Error;

/// Stage of the connect handshake that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationStage {
    CreateStream,
    PeerConnection,
    RemoteDescription,
    LocalAnswer,
    SendAnswer,
}

impl std::fmt::Display for NegotiationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NegotiationStage::CreateStream => "create stream",
            NegotiationStage::PeerConnection => "build peer connection",
            NegotiationStage::RemoteDescription => "apply remote offer",
            NegotiationStage::LocalAnswer => "create local answer",
            NegotiationStage::SendAnswer => "send SDP answer",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum AgentError {
    // Configuration errors (fail before any network call)
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credential: {name}")]
    MissingCredential { name: String },

    // Session setup
    #[error("Connect failed during {stage}: {message}")]
    Negotiation {
        stage: NegotiationStage,
        message: String,
    },

    // Remote services (streaming provider, backend, text generation)
    #[error("{service} error: {message}")]
    Provider {
        service: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    // Local talk rejections
    #[error("Please enter a message")]
    EmptyUtterance,

    #[error("No active streaming session. Connect first.")]
    NotConnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AgentError {
    pub fn missing(name: impl Into<String>) -> Self {
        AgentError::MissingCredential { name: name.into() }
    }

    pub fn provider(service: &str, status: Option<u16>, message: impl Into<String>) -> Self {
        AgentError::Provider {
            service: service.to_string(),
            status,
            message: message.into(),
        }
    }

    /// Configuration problems are surfaced as blocking alerts; everything
    /// else is reported in place.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            AgentError::Config(_) | AgentError::MissingCredential { .. }
        )
    }

    /// HTTP status carried by a provider error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            AgentError::Provider { status, .. } => *status,
            _ => None,
        }
    }
}
