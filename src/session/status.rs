// src/session/status.rs — Observable status snapshot

use super::transport::{
    IceConnectionState, IceGatheringState, PeerConnection, PeerConnectionState, SignalingState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingState {
    Disconnected,
    Idle,
    Streaming,
}

impl StreamingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Idle => "idle",
            Self::Streaming => "streaming",
        }
    }
}

/// Mirror of the transport's own state plus the live/idle video state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub peer: PeerConnectionState,
    pub ice: IceConnectionState,
    pub ice_gathering: IceGatheringState,
    pub signaling: SignalingState,
    pub streaming: StreamingState,
}

impl StatusSnapshot {
    /// Values shown when no connection exists.
    pub fn disconnected() -> Self {
        Self {
            peer: PeerConnectionState::Disconnected,
            ice: IceConnectionState::Disconnected,
            ice_gathering: IceGatheringState::Disconnected,
            signaling: SignalingState::Stable,
            streaming: StreamingState::Disconnected,
        }
    }

    /// Re-read the four transport fields, keeping the streaming state.
    pub fn refreshed_from(&self, peer: &dyn PeerConnection) -> Self {
        Self {
            peer: peer.connection_state(),
            ice: peer.ice_connection_state(),
            ice_gathering: peer.ice_gathering_state(),
            signaling: peer.signaling_state(),
            streaming: self.streaming,
        }
    }
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self::disconnected()
    }
}

impl std::fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "peer={} ice={} ice-gathering={} signaling={} streaming={}",
            self.peer.as_str(),
            self.ice.as_str(),
            self.ice_gathering.as_str(),
            self.signaling.as_str(),
            self.streaming.as_str()
        )
    }
}
