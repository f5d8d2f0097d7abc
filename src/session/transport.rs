// src/session/transport.rs — Peer-connection primitive seen by the session manager
//
// The runtime supplies the actual real-time media connection. The manager only
// drives it through `PeerConnection` and receives its callbacks as `PeerEvent`s
// on a channel, one channel per connection.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::mpsc;

use crate::infra::errors::AgentError;

// ─── Signaling payloads ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// An SDP blob plus its role, in the browser's `RTCSessionDescriptionInit` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    #[serde(deserialize_with = "one_or_many")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// `urls` may be a single string or a list.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(url) => vec![url],
        OneOrMany::Many(urls) => urls,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
}

// ─── Transport states ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl PeerConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl IceConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Checking => "checking",
            Self::Connected => "connected",
            Self::Completed => "completed",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }

    /// States after which the connection cannot recover.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceGatheringState {
    New,
    Gathering,
    Complete,
    /// Reset value after teardown; never reported by a live connection.
    Disconnected,
}

impl IceGatheringState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Gathering => "gathering",
            Self::Complete => "complete",
            Self::Disconnected => "disconnected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

impl SignalingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::HaveLocalOffer => "have-local-offer",
            Self::HaveRemoteOffer => "have-remote-offer",
            Self::HaveLocalPranswer => "have-local-pranswer",
            Self::HaveRemotePranswer => "have-remote-pranswer",
            Self::Closed => "closed",
        }
    }
}

// ─── Media ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Handle to an inbound media stream, as bound to a video sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: TrackKind,
    pub stream: MediaStream,
}

/// One entry of a statistics report. Only inbound RTP is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsReport {
    InboundRtp { kind: TrackKind, bytes_received: u64 },
    Other(String),
}

// ─── Events and the connection itself ───────────────────────────────────────

/// Callbacks raised by a peer connection.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    IceCandidate(IceCandidate),
    IceGatheringStateChange(IceGatheringState),
    IceConnectionStateChange(IceConnectionState),
    ConnectionStateChange(PeerConnectionState),
    SignalingStateChange(SignalingState),
    Track(RemoteTrack),
}

pub type PeerEvents = mpsc::UnboundedReceiver<PeerEvent>;

#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn set_remote_description(&self, offer: SessionDescription) -> Result<(), AgentError>;
    async fn create_answer(&self) -> Result<SessionDescription, AgentError>;
    async fn set_local_description(&self, answer: SessionDescription) -> Result<(), AgentError>;

    fn connection_state(&self) -> PeerConnectionState;
    fn ice_connection_state(&self) -> IceConnectionState;
    fn ice_gathering_state(&self) -> IceGatheringState;
    fn signaling_state(&self) -> SignalingState;

    /// Whether the track is still attached to one of the senders or receivers.
    async fn has_track(&self, track_id: &str) -> bool;

    /// Statistics scoped to one track.
    async fn stats(&self, track_id: &str) -> Result<Vec<StatsReport>, AgentError>;

    /// Stop delivering events. Safe to call repeatedly.
    fn clear_handlers(&self);

    /// Safe to call repeatedly.
    async fn close(&self) -> Result<(), AgentError>;
}

#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    async fn create(
        &self,
        ice_servers: &[IceServer],
    ) -> Result<(Arc<dyn PeerConnection>, PeerEvents), AgentError>;
}
