// src/session/liveness.rs — Byte-delta liveness detection for the live stream
//
// The provider never says when the avatar starts or stops speaking. Inbound
// video bytes only grow while it speaks, so each stats sample is compared with
// the previous one and the sinks are switched on transitions only.

use super::transport::{StatsReport, TrackKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Live,
    Idle,
}

#[derive(Debug, Default, Clone)]
pub struct LivenessDetector {
    last_observed_bytes: u64,
    playing: bool,
}

impl LivenessDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one cumulative byte count. Returns the new state only when it
    /// differs from the previous one. The count is always remembered.
    pub fn observe(&mut self, bytes_received: u64) -> Option<Liveness> {
        let playing = bytes_received > self.last_observed_bytes;
        self.last_observed_bytes = bytes_received;

        if playing == self.playing {
            return None;
        }
        self.playing = playing;
        Some(if playing { Liveness::Live } else { Liveness::Idle })
    }

    pub fn last_observed_bytes(&self) -> u64 {
        self.last_observed_bytes
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }
}

/// Cumulative bytes of the inbound video RTP report, if the sample has one.
pub fn inbound_video_bytes(reports: &[StatsReport]) -> Option<u64> {
    reports.iter().find_map(|r| match r {
        StatsReport::InboundRtp {
            kind: TrackKind::Video,
            bytes_received,
        } => Some(*bytes_received),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rise_goes_live_once() {
        let mut d = LivenessDetector::new();
        assert_eq!(d.observe(0), None);
        assert_eq!(d.observe(1000), Some(Liveness::Live));
        assert_eq!(d.observe(2000), None);
        assert_eq!(d.observe(3500), None);
        assert!(d.is_playing());
    }

    #[test]
    fn test_stall_goes_idle_once() {
        let mut d = LivenessDetector::new();
        d.observe(1000);
        assert_eq!(d.observe(1000), Some(Liveness::Idle));
        assert_eq!(d.observe(1000), None);
        assert_eq!(d.observe(1000), None);
        assert!(!d.is_playing());
    }

    #[test]
    fn test_count_persisted_every_sample() {
        let mut d = LivenessDetector::new();
        d.observe(10);
        d.observe(20);
        d.observe(20);
        assert_eq!(d.last_observed_bytes(), 20);
    }

    #[test]
    fn test_no_smoothing_flaps_on_alternating_samples() {
        let mut d = LivenessDetector::new();
        let transitions: Vec<_> = [100, 100, 200, 200, 300]
            .into_iter()
            .filter_map(|b| d.observe(b))
            .collect();
        assert_eq!(
            transitions,
            vec![
                Liveness::Live,
                Liveness::Idle,
                Liveness::Live,
                Liveness::Idle,
                Liveness::Live
            ]
        );
    }

    #[test]
    fn test_inbound_video_bytes_ignores_audio() {
        let reports = vec![
            StatsReport::Other("transport".into()),
            StatsReport::InboundRtp {
                kind: TrackKind::Audio,
                bytes_received: 9,
            },
            StatsReport::InboundRtp {
                kind: TrackKind::Video,
                bytes_received: 42,
            },
        ];
        assert_eq!(inbound_video_bytes(&reports), Some(42));
        assert_eq!(inbound_video_bytes(&reports[..2]), None);
    }
}
