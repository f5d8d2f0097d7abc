// src/session/mod.rs — Avatar streaming session manager
//
// Owns one streaming engagement at a time: the provider stream/session ids,
// the single peer connection, its event loop and the stats poller. Consumers
// drive it with connect/talk/disconnect and observe a StatusSnapshot; they
// never touch the transport directly.

pub mod liveness;
pub mod sinks;
pub mod status;
pub mod transport;
#[cfg(feature = "webrtc")]
pub mod webrtc;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::answer::AnswerSource;
use crate::infra::config::Config;
use crate::infra::errors::{AgentError, NegotiationStage};
use crate::provider::{CreateStreamRequest, StreamingApi, TalkScript};

use liveness::{Liveness, LivenessDetector};
use sinks::VideoSinks;
use status::{StatusSnapshot, StreamingState};
use transport::{
    PeerConnection, PeerConnectionFactory, PeerConnectionState, PeerEvent, PeerEvents, RemoteTrack,
    TrackKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Connecting,
    Connected,
    Talking,
    Disconnecting,
}

/// Fixed parameters for every stream this manager opens.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub source_url: String,
    pub stream_warmup: bool,
    pub video_quality: String,
    pub voice_id: String,
    pub driver_url: String,
    /// Forward answers to the avatar.
    pub narrate: bool,
    pub poll_interval: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            source_url: config.source_url.clone(),
            stream_warmup: config.stream_warmup,
            video_quality: config.video_quality.clone(),
            voice_id: config.voice_id.clone(),
            driver_url: config.driver_url.clone(),
            narrate: config.narrate,
            poll_interval: config.poll_interval(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// One user utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TalkRequest {
    pub text: String,
    pub voice_id: Option<String>,
}

impl TalkRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice_id: None,
        }
    }

    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = Some(voice_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TalkOutcome {
    pub answer: String,
    /// Whether the answer was sent to the avatar.
    pub narrated: bool,
}

/// Resources of the current engagement.
struct ActiveSession {
    generation: u64,
    stream_id: Option<String>,
    session_id: Option<String>,
    peer: Option<Arc<dyn PeerConnection>>,
    /// Cancels the event loop and every poller of this session.
    cancel: CancellationToken,
    /// Cancels the current stats poller only.
    poll_cancel: Option<CancellationToken>,
    live_attached: bool,
    liveness: LivenessDetector,
}

impl ActiveSession {
    fn ids(&self) -> Option<(String, String)> {
        Some((self.stream_id.clone()?, self.session_id.clone()?))
    }
}

struct State {
    phase: SessionPhase,
    generation: u64,
    active: Option<ActiveSession>,
}

impl State {
    fn active_mut(&mut self, generation: u64) -> Option<&mut ActiveSession> {
        self.active
            .as_mut()
            .filter(|a| a.generation == generation && !a.cancel.is_cancelled())
    }
}

struct Shared {
    provider: Arc<dyn StreamingApi>,
    transport: Arc<dyn PeerConnectionFactory>,
    answers: Arc<dyn AnswerSource>,
    sinks: Arc<dyn VideoSinks>,
    settings: SessionSettings,
    state: Mutex<State>,
    status: watch::Sender<StatusSnapshot>,
}

#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    pub fn new(
        provider: Arc<dyn StreamingApi>,
        transport: Arc<dyn PeerConnectionFactory>,
        answers: Arc<dyn AnswerSource>,
        sinks: Arc<dyn VideoSinks>,
        settings: SessionSettings,
    ) -> Self {
        let (status, _) = watch::channel(StatusSnapshot::disconnected());
        Self {
            shared: Arc::new(Shared {
                provider,
                transport,
                answers,
                sinks,
                settings,
                state: Mutex::new(State {
                    phase: SessionPhase::Idle,
                    generation: 0,
                    active: None,
                }),
                status,
            }),
        }
    }

    // ─── Observation ────────────────────────────────────────────

    pub fn phase(&self) -> SessionPhase {
        self.shared.lock().phase
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.phase(), SessionPhase::Connected | SessionPhase::Talking)
    }

    pub fn stream_id(&self) -> Option<String> {
        self.shared.lock().active.as_ref()?.stream_id.clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.shared.lock().active.as_ref()?.session_id.clone()
    }

    pub fn last_observed_bytes(&self) -> u64 {
        self.shared
            .lock()
            .active
            .as_ref()
            .map(|a| a.liveness.last_observed_bytes())
            .unwrap_or(0)
    }

    pub fn status(&self) -> StatusSnapshot {
        *self.shared.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.shared.status.subscribe()
    }

    // ─── Lifecycle ──────────────────────────────────────────────

    /// Open a stream and negotiate the peer connection.
    ///
    /// A no-op when the current connection already reports `connected`.
    /// Any other existing session is torn down first. On failure everything
    /// set up so far is released and the manager is back to `Idle`.
    pub async fn connect(&self) -> Result<(), AgentError> {
        let current = self.shared.lock().active.as_ref().and_then(|a| a.peer.clone());
        if let Some(peer) = current {
            if peer.connection_state() == PeerConnectionState::Connected {
                tracing::debug!("already connected, ignoring connect");
                return Ok(());
            }
        }

        self.shared.teardown(None).await;
        self.shared.provider.ensure_credentials()?;

        let generation = self.shared.begin();
        match self.shared.clone().negotiate(generation).await {
            Ok(()) => {
                let mut state = self.shared.lock();
                if state.active_mut(generation).is_none() {
                    // Torn down by a fatal transport event mid-handshake.
                    return Err(AgentError::Negotiation {
                        stage: NegotiationStage::PeerConnection,
                        message: "connection closed during setup".into(),
                    });
                }
                state.phase = SessionPhase::Connected;
                tracing::info!("streaming session connected");
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Connect failed: {}", e);
                self.shared.teardown(Some(generation)).await;
                Err(e)
            }
        }
    }

    /// Answer one utterance and, when narration is on, have the avatar speak it.
    ///
    /// Failures leave the session connected.
    pub async fn talk(&self, request: TalkRequest) -> Result<TalkOutcome, AgentError> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(AgentError::EmptyUtterance);
        }

        let (generation, stream_id, session_id) = {
            let mut state = self.shared.lock();
            if state.phase != SessionPhase::Connected {
                return Err(AgentError::NotConnected);
            }
            let generation = state.generation;
            let (stream_id, session_id) = state
                .active_mut(generation)
                .and_then(|a| a.ids())
                .ok_or(AgentError::NotConnected)?;
            state.phase = SessionPhase::Talking;
            (generation, stream_id, session_id)
        };

        let voice_id = request
            .voice_id
            .unwrap_or_else(|| self.shared.settings.voice_id.clone());
        let result = self
            .shared
            .run_talk(text, voice_id, &stream_id, &session_id)
            .await;

        {
            let mut state = self.shared.lock();
            if state.generation == generation && state.phase == SessionPhase::Talking {
                state.phase = SessionPhase::Connected;
            }
        }

        if let Err(ref e) = result {
            tracing::warn!("Talk failed: {}", e);
        }
        result
    }

    /// Delete the remote stream (best effort) and release every local resource.
    /// Safe to call in any phase, any number of times.
    pub async fn disconnect(&self) {
        let ids = {
            let mut state = self.shared.lock();
            let ids = state.active.as_ref().and_then(|a| a.ids());
            if state.active.is_some() {
                state.phase = SessionPhase::Disconnecting;
            }
            ids
        };

        if let Some((stream_id, session_id)) = ids {
            if let Err(e) = self.shared.provider.delete_stream(&stream_id, &session_id).await {
                tracing::warn!("Delete stream failed: {}", e);
            }
        }

        self.shared.teardown(None).await;
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // State stays consistent across a panicking holder: every mutation is a
        // single assignment.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a new generation in `Connecting`.
    fn begin(&self) -> u64 {
        let mut state = self.lock();
        state.generation += 1;
        state.phase = SessionPhase::Connecting;
        state.active = Some(ActiveSession {
            generation: state.generation,
            stream_id: None,
            session_id: None,
            peer: None,
            cancel: CancellationToken::new(),
            poll_cancel: None,
            live_attached: false,
            liveness: LivenessDetector::new(),
        });
        state.generation
    }

    fn superseded() -> AgentError {
        AgentError::Negotiation {
            stage: NegotiationStage::PeerConnection,
            message: "session was torn down during setup".into(),
        }
    }

    async fn negotiate(self: Arc<Self>, generation: u64) -> Result<(), AgentError> {
        let mut request = CreateStreamRequest::new(&self.settings.source_url, &self.settings.video_quality);
        request.stream_warmup = self.settings.stream_warmup;

        let stream = self
            .provider
            .create_stream(&request)
            .await
            .map_err(at(NegotiationStage::CreateStream))?;
        tracing::info!(stream_id = %stream.id, session_id = %stream.session_id, "stream created");

        let cancel = {
            let mut state = self.lock();
            let active = state.active_mut(generation).ok_or_else(Self::superseded)?;
            active.stream_id = Some(stream.id.clone());
            active.session_id = Some(stream.session_id.clone());
            active.cancel.clone()
        };

        let (peer, events) = self
            .transport
            .create(&stream.ice_servers)
            .await
            .map_err(at(NegotiationStage::PeerConnection))?;

        let installed = {
            let mut state = self.lock();
            match state.active_mut(generation) {
                Some(active) => {
                    active.peer = Some(peer.clone());
                    true
                }
                None => false,
            }
        };
        if !installed {
            peer.clear_handlers();
            if let Err(e) = peer.close().await {
                tracing::warn!("Closing superseded peer connection failed: {}", e);
            }
            return Err(Self::superseded());
        }

        tokio::spawn(self.clone().pump_events(generation, cancel, peer.clone(), events));

        peer.set_remote_description(stream.offer.clone())
            .await
            .map_err(at(NegotiationStage::RemoteDescription))?;
        tracing::debug!("remote offer applied");

        let answer = peer
            .create_answer()
            .await
            .map_err(at(NegotiationStage::LocalAnswer))?;
        peer.set_local_description(answer.clone())
            .await
            .map_err(at(NegotiationStage::LocalAnswer))?;
        tracing::debug!("local answer applied");

        self.provider
            .send_sdp_answer(&stream.id, &stream.session_id, &answer)
            .await
            .map_err(at(NegotiationStage::SendAnswer))?;
        tracing::debug!("SDP answer sent");

        Ok(())
    }

    async fn run_talk(
        &self,
        text: &str,
        voice_id: String,
        stream_id: &str,
        session_id: &str,
    ) -> Result<TalkOutcome, AgentError> {
        let answer = self.answers.answer(text).await?;
        let answer = answer.trim().to_string();
        if answer.is_empty() {
            return Err(AgentError::provider(self.answers.name(), None, "empty answer"));
        }

        if !self.settings.narrate {
            tracing::debug!("narration off, answer not sent to the avatar");
            return Ok(TalkOutcome {
                answer,
                narrated: false,
            });
        }

        let script = TalkScript {
            input: answer.clone(),
            voice_id,
            driver_url: self.settings.driver_url.clone(),
        };
        self.provider.talk(stream_id, session_id, &script).await?;
        Ok(TalkOutcome {
            answer,
            narrated: true,
        })
    }

    // ─── Transport events ───────────────────────────────────────

    async fn pump_events(
        self: Arc<Self>,
        generation: u64,
        cancel: CancellationToken,
        peer: Arc<dyn PeerConnection>,
        mut events: PeerEvents,
    ) {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle_event(generation, &cancel, &peer, event).await;
        }
        tracing::debug!(generation, "transport event loop finished");
    }

    async fn handle_event(
        self: &Arc<Self>,
        generation: u64,
        cancel: &CancellationToken,
        peer: &Arc<dyn PeerConnection>,
        event: PeerEvent,
    ) {
        match event {
            PeerEvent::IceCandidate(candidate) => {
                let ids = self.lock().active_mut(generation).and_then(|a| a.ids());
                let Some((stream_id, session_id)) = ids else {
                    tracing::debug!("ICE candidate without session ids, dropped");
                    return;
                };
                let provider = self.provider.clone();
                tokio::spawn(async move {
                    if let Err(e) = provider
                        .send_ice_candidate(&stream_id, &session_id, &candidate)
                        .await
                    {
                        tracing::warn!("Failed to send ICE candidate: {}", e);
                    }
                });
            }
            PeerEvent::IceConnectionStateChange(state) => {
                self.refresh_status(generation, peer.as_ref());
                if state.is_fatal() {
                    tracing::info!("ICE connection {}, cleaning up", state.as_str());
                    self.teardown(Some(generation)).await;
                }
            }
            PeerEvent::IceGatheringStateChange(_)
            | PeerEvent::ConnectionStateChange(_)
            | PeerEvent::SignalingStateChange(_) => {
                self.refresh_status(generation, peer.as_ref());
            }
            PeerEvent::Track(track) => {
                if track.kind == TrackKind::Video {
                    self.on_video_track(generation, cancel, peer, track);
                }
            }
        }
    }

    fn refresh_status(&self, generation: u64, peer: &dyn PeerConnection) {
        let mut state = self.lock();
        if state.active_mut(generation).is_none() {
            return;
        }
        self.status.send_modify(|s| *s = s.refreshed_from(peer));
        drop(state);
    }

    fn on_video_track(
        self: &Arc<Self>,
        generation: u64,
        cancel: &CancellationToken,
        peer: &Arc<dyn PeerConnection>,
        track: RemoteTrack,
    ) {
        let poll_cancel = {
            let mut state = self.lock();
            let Some(active) = state.active_mut(generation) else {
                return;
            };
            if !active.live_attached {
                self.sinks.attach_live(&track.stream);
                active.live_attached = true;
            }
            if let Some(previous) = active.poll_cancel.take() {
                previous.cancel();
            }
            let token = cancel.child_token();
            active.poll_cancel = Some(token.clone());
            token
        };
        tracing::debug!(track = %track.id, "video track received, polling stats");

        tokio::spawn(self.clone().poll_stats(generation, poll_cancel, peer.clone(), track));
    }

    async fn poll_stats(
        self: Arc<Self>,
        generation: u64,
        cancel: CancellationToken,
        peer: Arc<dyn PeerConnection>,
        track: RemoteTrack,
    ) {
        let period = self.settings.poll_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if !peer.has_track(&track.id).await {
                tracing::debug!(track = %track.id, "track gone, stopping stats poll");
                break;
            }

            let reports = match peer.stats(&track.id).await {
                Ok(reports) => reports,
                Err(e) => {
                    tracing::warn!("getStats failed, stopping stats poll: {}", e);
                    break;
                }
            };

            if let Some(bytes) = liveness::inbound_video_bytes(&reports) {
                if !self.observe_bytes(generation, &track, bytes) {
                    break;
                }
            }
        }
    }

    /// Apply one byte sample. Returns false once the session is gone.
    fn observe_bytes(&self, generation: u64, track: &RemoteTrack, bytes: u64) -> bool {
        let mut state = self.lock();
        let Some(active) = state.active_mut(generation) else {
            return false;
        };

        match active.liveness.observe(bytes) {
            Some(Liveness::Live) => {
                if !active.live_attached {
                    self.sinks.attach_live(&track.stream);
                    active.live_attached = true;
                }
                self.sinks.hide_idle();
                self.sinks.play_live();
                self.status.send_modify(|s| s.streaming = StreamingState::Streaming);
                tracing::debug!(bytes, "live stream flowing");
            }
            Some(Liveness::Idle) => {
                self.sinks.pause_live();
                self.sinks.detach_live();
                active.live_attached = false;
                self.sinks.show_idle();
                self.status.send_modify(|s| s.streaming = StreamingState::Idle);
                tracing::debug!(bytes, "live stream stalled");
            }
            None => {}
        }
        true
    }

    // ─── Cleanup ────────────────────────────────────────────────

    /// Release the current session's resources and reset observable state.
    ///
    /// With `Some(generation)`, does nothing if a newer session has started.
    async fn teardown(&self, expected: Option<u64>) {
        let taken = {
            let mut state = self.lock();
            if let Some(generation) = expected {
                if state.generation != generation {
                    return;
                }
            }
            let taken = state.active.take();
            if let Some(ref active) = taken {
                active.cancel.cancel();
            }

            self.sinks.stop_live_tracks();
            self.sinks.detach_live();
            self.sinks.pause_live();
            self.sinks.show_idle();
            self.status.send_replace(StatusSnapshot::disconnected());
            state.phase = SessionPhase::Idle;
            taken
        };

        if let Some(peer) = taken.and_then(|a| a.peer) {
            peer.clear_handlers();
            match peer.close().await {
                Ok(()) => tracing::debug!("peer connection closed"),
                Err(e) => tracing::warn!("Closing peer connection failed: {}", e),
            }
        }
    }
}

/// Tag a handshake failure with its stage. Configuration errors pass through.
fn at(stage: NegotiationStage) -> impl FnOnce(AgentError) -> AgentError {
    move |e| match e {
        e @ (AgentError::Config(_) | AgentError::MissingCredential { .. } | AgentError::Negotiation { .. }) => e,
        other => AgentError::Negotiation {
            stage,
            message: other.to_string(),
        },
    }
}
