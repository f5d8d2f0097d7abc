// src/session/webrtc.rs — Peer connection backed by webrtc-rs
//
// Receive-only: the avatar's audio and video arrive as remote tracks, nothing
// is sent back. Callbacks are forwarded as PeerEvents on an unbounded channel
// whose sender is dropped by clear_handlers.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_gathering_state::RTCIceGatheringState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::stats::StatsReportType;
use webrtc::track::track_remote::TrackRemote;

use super::transport::{
    IceCandidate, IceConnectionState, IceGatheringState, IceServer, MediaStream, PeerConnection,
    PeerConnectionFactory, PeerConnectionState, PeerEvent, PeerEvents, RemoteTrack, SdpType,
    SessionDescription, SignalingState, StatsReport, TrackKind,
};
use crate::infra::errors::AgentError;

type EventSender = Arc<Mutex<Option<mpsc::UnboundedSender<PeerEvent>>>>;

fn transport_err(e: impl std::fmt::Display) -> AgentError {
    AgentError::Transport(e.to_string())
}

fn emit(sender: &EventSender, event: PeerEvent) {
    let guard = sender.lock().unwrap_or_else(|p| p.into_inner());
    if let Some(tx) = guard.as_ref() {
        let _ = tx.send(event);
    }
}

#[derive(Debug, Default)]
pub struct WebRtcFactory;

#[async_trait]
impl PeerConnectionFactory for WebRtcFactory {
    async fn create(
        &self,
        ice_servers: &[IceServer],
    ) -> Result<(Arc<dyn PeerConnection>, PeerEvents), AgentError> {
        let mut media = MediaEngine::default();
        media.register_default_codecs().map_err(transport_err)?;
        let registry = register_default_interceptors(Registry::new(), &mut media).map_err(transport_err)?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: ice_servers
                .iter()
                .map(|s| RTCIceServer {
                    urls: s.urls.clone(),
                    username: s.username.clone().unwrap_or_default(),
                    credential: s.credential.clone().unwrap_or_default(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        let pc = Arc::new(api.new_peer_connection(config).await.map_err(transport_err)?);

        let (tx, rx) = mpsc::unbounded_channel();
        let sender: EventSender = Arc::new(Mutex::new(Some(tx)));
        install_handlers(&pc, &sender);

        Ok((Arc::new(WebRtcPeer { pc, sender }), rx))
    }
}

fn install_handlers(pc: &Arc<RTCPeerConnection>, sender: &EventSender) {
    let s = sender.clone();
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let s = s.clone();
        Box::pin(async move {
            // None marks the end of gathering.
            let Some(candidate) = candidate else { return };
            match candidate.to_json() {
                Ok(init) => emit(
                    &s,
                    PeerEvent::IceCandidate(IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                    }),
                ),
                Err(e) => tracing::warn!("Unserializable ICE candidate: {}", e),
            }
        })
    }));

    let s = sender.clone();
    pc.on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
        let s = s.clone();
        Box::pin(async move {
            let mapped = match state {
                RTCIceGathererState::Gathering => IceGatheringState::Gathering,
                RTCIceGathererState::Complete => IceGatheringState::Complete,
                _ => IceGatheringState::New,
            };
            emit(&s, PeerEvent::IceGatheringStateChange(mapped));
        })
    }));

    let s = sender.clone();
    pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
        let s = s.clone();
        Box::pin(async move {
            emit(&s, PeerEvent::IceConnectionStateChange(map_ice(state)));
        })
    }));

    let s = sender.clone();
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let s = s.clone();
        Box::pin(async move {
            emit(&s, PeerEvent::ConnectionStateChange(map_peer(state)));
        })
    }));

    let s = sender.clone();
    pc.on_signaling_state_change(Box::new(move |state: RTCSignalingState| {
        let s = s.clone();
        Box::pin(async move {
            emit(&s, PeerEvent::SignalingStateChange(map_signaling(state)));
        })
    }));

    let s = sender.clone();
    pc.on_track(Box::new(
        move |track: Arc<TrackRemote>, _receiver: Arc<RTCRtpReceiver>, _transceiver: Arc<RTCRtpTransceiver>| {
            let s = s.clone();
            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Video => TrackKind::Video,
                    _ => TrackKind::Audio,
                };
                emit(
                    &s,
                    PeerEvent::Track(RemoteTrack {
                        id: track.id(),
                        kind,
                        stream: MediaStream { id: track.stream_id() },
                    }),
                );
                // Drain RTP so the receiver keeps counting bytes.
                tokio::spawn(async move { while track.read_rtp().await.is_ok() {} });
            })
        },
    ));
}

pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
    sender: EventSender,
}

#[async_trait]
impl PeerConnection for WebRtcPeer {
    async fn set_remote_description(&self, offer: SessionDescription) -> Result<(), AgentError> {
        let desc = match offer.kind {
            SdpType::Offer => RTCSessionDescription::offer(offer.sdp),
            SdpType::Answer => RTCSessionDescription::answer(offer.sdp),
            SdpType::Pranswer => RTCSessionDescription::pranswer(offer.sdp),
            SdpType::Rollback => return Err(AgentError::Transport("rollback is not supported".into())),
        }
        .map_err(transport_err)?;
        self.pc.set_remote_description(desc).await.map_err(transport_err)
    }

    async fn create_answer(&self) -> Result<SessionDescription, AgentError> {
        let answer = self.pc.create_answer(None).await.map_err(transport_err)?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, answer: SessionDescription) -> Result<(), AgentError> {
        let desc = RTCSessionDescription::answer(answer.sdp).map_err(transport_err)?;
        self.pc.set_local_description(desc).await.map_err(transport_err)
    }

    fn connection_state(&self) -> PeerConnectionState {
        map_peer(self.pc.connection_state())
    }

    fn ice_connection_state(&self) -> IceConnectionState {
        map_ice(self.pc.ice_connection_state())
    }

    fn ice_gathering_state(&self) -> IceGatheringState {
        match self.pc.ice_gathering_state() {
            RTCIceGatheringState::Gathering => IceGatheringState::Gathering,
            RTCIceGatheringState::Complete => IceGatheringState::Complete,
            _ => IceGatheringState::New,
        }
    }

    fn signaling_state(&self) -> SignalingState {
        map_signaling(self.pc.signaling_state())
    }

    async fn has_track(&self, track_id: &str) -> bool {
        for receiver in self.pc.get_receivers().await {
            if receiver.tracks().await.iter().any(|t| t.id() == track_id) {
                return true;
            }
        }
        for sender in self.pc.get_senders().await {
            if let Some(track) = sender.track().await {
                if track.id() == track_id {
                    return true;
                }
            }
        }
        false
    }

    async fn stats(&self, track_id: &str) -> Result<Vec<StatsReport>, AgentError> {
        let report = self.pc.get_stats().await;
        Ok(report
            .reports
            .into_values()
            .filter_map(|entry| match entry {
                StatsReportType::InboundRTP(rtp) if rtp.track_identifier == track_id || rtp.track_identifier.is_empty() => {
                    let kind = if rtp.kind == "video" {
                        TrackKind::Video
                    } else {
                        TrackKind::Audio
                    };
                    Some(StatsReport::InboundRtp {
                        kind,
                        bytes_received: rtp.bytes_received,
                    })
                }
                StatsReportType::InboundRTP(_) => None,
                _ => Some(StatsReport::Other("other".into())),
            })
            .collect())
    }

    fn clear_handlers(&self) {
        self.sender.lock().unwrap_or_else(|p| p.into_inner()).take();
    }

    async fn close(&self) -> Result<(), AgentError> {
        if self.pc.connection_state() == RTCPeerConnectionState::Closed {
            return Ok(());
        }
        self.pc.close().await.map_err(transport_err)
    }
}

fn map_peer(state: RTCPeerConnectionState) -> PeerConnectionState {
    match state {
        RTCPeerConnectionState::Connecting => PeerConnectionState::Connecting,
        RTCPeerConnectionState::Connected => PeerConnectionState::Connected,
        RTCPeerConnectionState::Disconnected => PeerConnectionState::Disconnected,
        RTCPeerConnectionState::Failed => PeerConnectionState::Failed,
        RTCPeerConnectionState::Closed => PeerConnectionState::Closed,
        _ => PeerConnectionState::New,
    }
}

fn map_ice(state: RTCIceConnectionState) -> IceConnectionState {
    match state {
        RTCIceConnectionState::Checking => IceConnectionState::Checking,
        RTCIceConnectionState::Connected => IceConnectionState::Connected,
        RTCIceConnectionState::Completed => IceConnectionState::Completed,
        RTCIceConnectionState::Disconnected => IceConnectionState::Disconnected,
        RTCIceConnectionState::Failed => IceConnectionState::Failed,
        RTCIceConnectionState::Closed => IceConnectionState::Closed,
        _ => IceConnectionState::New,
    }
}

fn map_signaling(state: RTCSignalingState) -> SignalingState {
    match state {
        RTCSignalingState::HaveLocalOffer => SignalingState::HaveLocalOffer,
        RTCSignalingState::HaveRemoteOffer => SignalingState::HaveRemoteOffer,
        RTCSignalingState::HaveLocalPranswer => SignalingState::HaveLocalPranswer,
        RTCSignalingState::HaveRemotePranswer => SignalingState::HaveRemotePranswer,
        RTCSignalingState::Closed => SignalingState::Closed,
        _ => SignalingState::Stable,
    }
}
