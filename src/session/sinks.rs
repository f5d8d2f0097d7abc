// src/session/sinks.rs — Idle and live video sinks

use super::transport::MediaStream;

/// The two video surfaces: a looping idle clip and the live avatar stream.
///
/// Calls are synchronous and may be repeated; implementations should treat
/// showing a visible sink or pausing a paused one as a no-op.
pub trait VideoSinks: Send + Sync {
    fn show_idle(&self);
    fn hide_idle(&self);

    /// Bind the inbound stream to the live sink without showing it.
    fn attach_live(&self, stream: &MediaStream);
    /// Show the live sink and start playback.
    fn play_live(&self);
    /// Pause and hide the live sink.
    fn pause_live(&self);
    /// Clear the live sink's stream reference.
    fn detach_live(&self);
    /// Stop every media track bound to the live sink.
    fn stop_live_tracks(&self);
}

/// Headless sinks that only log, for terminals.
#[derive(Debug, Default)]
pub struct TracingSinks;

impl VideoSinks for TracingSinks {
    fn show_idle(&self) {
        tracing::debug!("idle video shown");
    }

    fn hide_idle(&self) {
        tracing::debug!("idle video hidden");
    }

    fn attach_live(&self, stream: &MediaStream) {
        tracing::debug!(stream = %stream.id, "live stream attached");
    }

    fn play_live(&self) {
        tracing::info!("avatar speaking");
    }

    fn pause_live(&self) {
        tracing::debug!("live video paused");
    }

    fn detach_live(&self) {
        tracing::debug!("live stream detached");
    }

    fn stop_live_tracks(&self) {
        tracing::debug!("live tracks stopped");
    }
}
