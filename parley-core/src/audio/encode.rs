//! Outbound PCM framing.
//!
//! The server consumes fixed 4096-sample frames of 16 kHz mono i16 PCM
//! (8192 bytes on the wire). `FrameAssembler` turns the capture worker's
//! variable-length f32 blocks into that shape.

use crate::buffering::AudioFrame;

/// Sample rate of outbound audio, after resampling.
pub const OUTBOUND_SAMPLE_RATE: u32 = 16_000;

/// Samples per outbound frame (256 ms at 16 kHz).
pub const OUTBOUND_FRAME_SAMPLES: usize = 4096;

/// Converts one float sample to i16 wire format.
///
/// Clamped to [-1, 1]; negatives scale by 32768 and positives by 32767 so
/// both rails map onto representable values without overflow.
fn encode_sample(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped < 0.0 {
        (clamped * 32768.0).round() as i16
    } else {
        (clamped * 32767.0).round() as i16
    }
}

/// Accumulates f32 samples and emits complete outbound frames.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    pending: Vec<i16>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends samples, returning every frame completed by this push.
    /// Usually zero or one frame; more if `samples` is very large.
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        self.pending.reserve(samples.len());
        self.pending.extend(samples.iter().map(|&s| encode_sample(s)));

        let mut frames = Vec::new();
        while self.pending.len() >= OUTBOUND_FRAME_SAMPLES {
            let rest = self.pending.split_off(OUTBOUND_FRAME_SAMPLES);
            let full = std::mem::replace(&mut self.pending, rest);
            frames.push(AudioFrame::new(full, OUTBOUND_SAMPLE_RATE));
        }
        frames
    }

    /// Samples buffered toward the next frame. A non-empty remainder at end
    /// of capture is dropped, not flushed; the worker logs how much was lost.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
