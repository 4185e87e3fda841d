//! Silence-based end-of-turn detection.
//!
//! The server does its own speech processing; this detector only decides
//! when the candidate has likely finished speaking so the client can send
//! an advisory `end_of_turn` control message. It is a latch: loudness above
//! the threshold re-arms it, and sustained silence fires it exactly once.

use std::time::{Duration, Instant};

use crate::buffering::AudioFrame;

#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// RMS threshold in i16 sample units. Frames at or above this level
    /// count as speech.
    pub rms_threshold: f32,
    /// How long the signal must stay below the threshold before one
    /// end-of-turn signal is emitted.
    pub silence: Duration,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            rms_threshold: 400.0,
            silence: Duration::from_millis(7000),
        }
    }
}

/// Root mean square of a block of i16 samples, in i16 units.
/// Accumulates in f64 so long frames do not lose precision.
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

#[derive(Debug)]
pub struct TurnDetector {
    config: TurnConfig,
    last_loud: Instant,
    signaled: bool,
}

impl TurnDetector {
    /// `now` seeds the last-loud timestamp so a session that starts in
    /// silence still waits the full window before signaling.
    pub fn new(config: TurnConfig, now: Instant) -> Self {
        Self {
            config,
            last_loud: now,
            signaled: false,
        }
    }

    /// Feeds one frame at time `now`. Returns `true` exactly once per
    /// quiet stretch, when silence first reaches the configured duration.
    pub fn observe(&mut self, frame: &AudioFrame, now: Instant) -> bool {
        let level = rms(&frame.samples);
        if level >= self.config.rms_threshold {
            self.last_loud = now;
            self.signaled = false;
            return false;
        }
        if !self.signaled && now.duration_since(self.last_loud) >= self.config.silence {
            self.signaled = true;
            return true;
        }
        false
    }

    /// Re-arms the detector, e.g. when capture restarts.
    pub fn reset(&mut self, now: Instant) {
        self.last_loud = now;
        self.signaled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silent_frame() -> AudioFrame {
        AudioFrame::new(vec![0; 4096], 16_000)
    }

    fn loud_frame() -> AudioFrame {
        AudioFrame::new(vec![3000; 4096], 16_000)
    }

    fn detector(base: Instant) -> TurnDetector {
        TurnDetector::new(TurnConfig::default(), base)
    }

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(rms(&[0; 1024]), 0.0);
    }

    #[test]
    fn rms_of_constant_block_is_its_magnitude() {
        let level = rms(&[-500; 1024]);
        assert!((level - 500.0).abs() < 0.01);
    }

    #[test]
    fn fires_once_when_silence_reaches_duration() {
        let base = Instant::now();
        let mut det = detector(base);

        // Speech, then silence sampled every second.
        assert!(!det.observe(&loud_frame(), base));
        for secs in 1..7 {
            assert!(!det.observe(&silent_frame(), base + Duration::from_secs(secs)));
        }
        assert!(det.observe(&silent_frame(), base + Duration::from_secs(7)));
        // Latched: further silence stays quiet.
        assert!(!det.observe(&silent_frame(), base + Duration::from_secs(8)));
        assert!(!det.observe(&silent_frame(), base + Duration::from_secs(60)));
    }

    #[test]
    fn loud_frame_resets_the_latch() {
        let base = Instant::now();
        let mut det = detector(base);

        assert!(det.observe(&silent_frame(), base + Duration::from_secs(7)));
        assert!(!det.observe(&loud_frame(), base + Duration::from_secs(8)));
        // A fresh 7 s quiet window fires again.
        assert!(!det.observe(&silent_frame(), base + Duration::from_secs(14)));
        assert!(det.observe(&silent_frame(), base + Duration::from_secs(15)));
    }

    #[test]
    fn near_threshold_frames_count_as_speech() {
        let base = Instant::now();
        let mut det = detector(base);

        // RMS exactly at the threshold is speech, so the clock keeps resetting.
        let at_threshold = AudioFrame::new(vec![400; 4096], 16_000);
        for secs in 0..20 {
            assert!(!det.observe(&at_threshold, base + Duration::from_secs(secs)));
        }
    }

    #[test]
    fn reset_rearms_after_firing() {
        let base = Instant::now();
        let mut det = detector(base);

        assert!(det.observe(&silent_frame(), base + Duration::from_secs(7)));
        det.reset(base + Duration::from_secs(10));
        assert!(!det.observe(&silent_frame(), base + Duration::from_secs(16)));
        assert!(det.observe(&silent_frame(), base + Duration::from_secs(17)));
    }
}
