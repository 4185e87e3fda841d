//! Speaker playback of server audio.
//!
//! Server chunks are 24 kHz mono i16 PCM of arbitrary length. They arrive on
//! the tokio event loop and cross to the cpal output callback over a
//! `crossbeam-channel`; the callback owns a [`PlaybackQueue`] exclusively,
//! tops it up with `try_recv`, and fills the device buffer without ever
//! blocking. Underrun plays silence, not an error.

use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crossbeam_channel::Receiver;

use crate::error::Result;
#[cfg(feature = "audio-cpal")]
use crate::error::ParleyError;

/// Sample rate of inbound server audio.
pub const INBOUND_SAMPLE_RATE: u32 = 24_000;

/// Ordered queue of pending PCM buffers with a read cursor into the head.
///
/// `fill` always satisfies the whole output slice: real samples while any
/// are queued, 0.0 silence once the queue runs dry. Exhausted head buffers
/// are popped as the cursor passes them.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    buffers: VecDeque<Vec<i16>>,
    cursor: usize,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one server chunk. Empty chunks are ignored.
    pub fn push(&mut self, chunk: Vec<i16>) {
        if !chunk.is_empty() {
            self.buffers.push_back(chunk);
        }
    }

    /// Fills `out` completely, converting i16 → f32 by dividing by 32768.
    /// Returns how many real (non-silence) samples were written.
    pub fn fill(&mut self, out: &mut [f32]) -> usize {
        let mut written = 0;
        for slot in out.iter_mut() {
            match self.next_sample() {
                Some(sample) => {
                    *slot = sample as f32 / 32768.0;
                    written += 1;
                }
                None => *slot = 0.0,
            }
        }
        written
    }

    /// Total samples queued, including the partially-consumed head.
    pub fn queued_samples(&self) -> usize {
        let mut total: usize = self.buffers.iter().map(|b| b.len()).sum();
        total -= self.cursor;
        total
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
        self.cursor = 0;
    }

    fn next_sample(&mut self) -> Option<i16> {
        loop {
            let head = self.buffers.front()?;
            if self.cursor < head.len() {
                let sample = head[self.cursor];
                self.cursor += 1;
                return Some(sample);
            }
            self.buffers.pop_front();
            self.cursor = 0;
        }
    }
}

/// Handle to an active speaker stream.
///
/// **Not `Send`** — like capture, create and drop on the same OS thread.
pub struct AudioPlayback {
    #[cfg(feature = "audio-cpal")]
    _stream: cpal::Stream,
    running: Arc<AtomicBool>,
}

impl AudioPlayback {
    /// Opens the default output device at 24 kHz mono and starts draining
    /// `rx`. Devices that reject that config surface an `AudioStream` error
    /// rather than silently resampling.
    #[cfg(feature = "audio-cpal")]
    pub fn open_default(rx: Receiver<Vec<i16>>, running: Arc<AtomicBool>) -> Result<Self> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
        use cpal::{SampleRate, StreamConfig};
        use tracing::{error, info};

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(ParleyError::NoDefaultOutputDevice)?;

        info!(
            device = device.name().unwrap_or_default().as_str(),
            sample_rate = INBOUND_SAMPLE_RATE,
            "opening output device"
        );

        let config = StreamConfig {
            channels: 1,
            sample_rate: SampleRate(INBOUND_SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        let running_cb = Arc::clone(&running);
        let mut queue = PlaybackQueue::new();
        let stream = device
            .build_output_stream(
                &config,
                move |out: &mut [f32], _info| {
                    if !running_cb.load(Ordering::Relaxed) {
                        out.fill(0.0);
                        return;
                    }
                    while let Ok(chunk) = rx.try_recv() {
                        queue.push(chunk);
                    }
                    queue.fill(out);
                },
                |err| error!("playback stream error: {err}"),
                None,
            )
            .map_err(|e| ParleyError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| ParleyError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
        })
    }

    /// Stub when the `audio-cpal` feature is disabled: consumes nothing.
    #[cfg(not(feature = "audio-cpal"))]
    pub fn open_default(_rx: Receiver<Vec<i16>>, running: Arc<AtomicBool>) -> Result<Self> {
        Ok(Self { running })
    }

    /// Mutes the callback; the stream is released when this value drops.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn empty_queue_fills_silence() {
        let mut queue = PlaybackQueue::new();
        let mut out = [1.0f32; 64];
        assert_eq!(queue.fill(&mut out), 0);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn decoded_samples_divide_by_32768() {
        let mut queue = PlaybackQueue::new();
        queue.push(vec![i16::MIN, 0, 16384, i16::MAX]);
        let mut out = [0.0f32; 4];
        assert_eq!(queue.fill(&mut out), 4);
        assert_relative_eq!(out[0], -1.0);
        assert_eq!(out[1], 0.0);
        assert_relative_eq!(out[2], 0.5);
        assert_relative_eq!(out[3], 32767.0 / 32768.0);
    }

    #[test]
    fn underrun_pads_with_silence_then_resumes() {
        let mut queue = PlaybackQueue::new();
        queue.push(vec![1000; 3]);
        let mut out = [9.9f32; 6];
        assert_eq!(queue.fill(&mut out), 3);
        assert!(out[..3].iter().all(|&s| s != 0.0));
        assert!(out[3..].iter().all(|&s| s == 0.0));

        // Late-arriving audio plays, never the stale tail.
        queue.push(vec![-2000; 2]);
        let mut out2 = [0.0f32; 2];
        assert_eq!(queue.fill(&mut out2), 2);
        assert_relative_eq!(out2[0], -2000.0 / 32768.0);
    }

    #[test]
    fn fill_spans_multiple_chunks() {
        let mut queue = PlaybackQueue::new();
        queue.push(vec![1, 2]);
        queue.push(vec![3]);
        queue.push(vec![4, 5, 6]);
        assert_eq!(queue.queued_samples(), 6);

        let mut out = [0.0f32; 6];
        assert_eq!(queue.fill(&mut out), 6);
        let expected: Vec<f32> = (1..=6).map(|s| s as f32 / 32768.0).collect();
        assert_eq!(out.to_vec(), expected);
        assert_eq!(queue.queued_samples(), 0);
    }

    #[test]
    fn clear_discards_pending_audio() {
        let mut queue = PlaybackQueue::new();
        queue.push(vec![500; 100]);
        queue.clear();
        let mut out = [1.0f32; 8];
        assert_eq!(queue.fill(&mut out), 0);
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
