//! Microphone capture and speaker playback via cpal.
//!
//! # Design constraints
//!
//! The cpal callbacks run on OS audio threads at elevated priority. They
//! must not allocate, block on a lock, or perform I/O. Capture writes into
//! an SPSC ring buffer producer; playback reads from a callback-owned
//! [`playback::PlaybackQueue`] topped up by non-blocking `try_recv`.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS), so streams must be created and dropped on the same thread. The
//! client opens them inside `tokio::task::spawn_blocking`.

pub mod device;
pub mod encode;
pub mod playback;
pub mod resample;

pub use playback::AudioPlayback;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

use crate::buffering::CaptureProducer;
#[cfg(feature = "audio-cpal")]
use crate::buffering::Producer;
use crate::error::{ParleyError, Result};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

/// Handle to an active microphone stream.
///
/// **Not `Send`** — create and drop on the same OS thread.
pub struct AudioCapture {
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Set to `false` to make the callback a no-op.
    running: Arc<AtomicBool>,
    /// Capture rate reported by the device (Hz); rarely 16 kHz, which is
    /// why the capture worker resamples.
    pub sample_rate: u32,
}

/// Mixes an interleaved block down to mono into `mix_buf` (reused between
/// callbacks, so it only allocates while growing toward the device's block
/// size) and pushes it into the ring.
#[cfg(feature = "audio-cpal")]
fn push_mono(
    producer: &mut CaptureProducer,
    mix_buf: &mut Vec<f32>,
    data: &[f32],
    channels: usize,
) {
    let pushed = if channels == 1 {
        producer.push_slice(data)
    } else {
        let frames = data.len() / channels;
        mix_buf.resize(frames, 0.0);
        for (frame_idx, frame) in data.chunks_exact(channels).enumerate() {
            mix_buf[frame_idx] = frame.iter().sum::<f32>() / channels as f32;
        }
        producer.push_slice(mix_buf)
    };
    let total = if channels == 1 {
        data.len()
    } else {
        data.len() / channels
    };
    if pushed < total {
        warn!("capture ring full: dropped {} samples", total - pushed);
    }
}

impl AudioCapture {
    /// Opens an input device by preferred name, falling back to the system
    /// default and then to the first enumerable input.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        mut producer: CaptureProducer,
        running: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        let host = cpal::default_host();

        let mut selected = None;
        if let Some(wanted) = preferred_device_name {
            match host.input_devices() {
                Ok(mut devices) => {
                    selected =
                        devices.find(|d| d.name().map(|n| n == wanted).unwrap_or(false));
                    if selected.is_none() {
                        warn!("preferred input device '{wanted}' not found, falling back");
                    }
                }
                Err(e) => warn!("failed to enumerate input devices: {e}"),
            }
        }

        let device = match selected.or_else(|| host.default_input_device()) {
            Some(device) => device,
            None => {
                let mut devices = host
                    .input_devices()
                    .map_err(|e| ParleyError::AudioDevice(e.to_string()))?;
                let first = devices.next().ok_or(ParleyError::NoDefaultInputDevice)?;
                warn!("no default input device, using first available input");
                first
            }
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| ParleyError::AudioDevice(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(sample_rate, channels, "capture config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let ch = channels as usize;
        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                let running = Arc::clone(&running);
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _info| {
                        if !running.load(Ordering::Relaxed) {
                            return;
                        }
                        push_mono(&mut producer, &mut mix_buf, data, ch);
                    },
                    |err| error!("capture stream error: {err}"),
                    None,
                )
            }
            SampleFormat::I16 => {
                let running = Arc::clone(&running);
                let mut f32_buf: Vec<f32> = Vec::new();
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _info| {
                        if !running.load(Ordering::Relaxed) {
                            return;
                        }
                        f32_buf.resize(data.len(), 0.0);
                        for (dst, src) in f32_buf.iter_mut().zip(data) {
                            *dst = *src as f32 / 32768.0;
                        }
                        push_mono(&mut producer, &mut mix_buf, &f32_buf, ch);
                    },
                    |err| error!("capture stream error: {err}"),
                    None,
                )
            }
            fmt => {
                return Err(ParleyError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| ParleyError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| ParleyError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }

    /// Opens the system default microphone.
    ///
    /// # Errors
    /// `ParleyError::NoDefaultInputDevice` when no microphone is available,
    /// `ParleyError::AudioStream` if cpal fails to build or start the stream.
    #[cfg(feature = "audio-cpal")]
    pub fn open_default(producer: CaptureProducer, running: Arc<AtomicBool>) -> Result<Self> {
        Self::open_with_preference(producer, running, None)
    }

    /// Signals the callback to no-op; the stream itself is released when
    /// the owning thread drops this value.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Stub when the `audio-cpal` feature is disabled. `stop` stays in the
/// main impl, which is not gated.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_with_preference(
        _producer: CaptureProducer,
        _running: Arc<AtomicBool>,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(ParleyError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    pub fn open_default(producer: CaptureProducer, running: Arc<AtomicBool>) -> Result<Self> {
        Self::open_with_preference(producer, running, None)
    }
}

#[cfg(all(test, not(feature = "audio-cpal")))]
mod stub_tests {
    use super::*;
    use crate::buffering::create_capture_ring;

    #[test]
    fn stub_capture_reports_missing_backend() {
        let (producer, _consumer) = create_capture_ring();
        let running = Arc::new(AtomicBool::new(true));
        let err = AudioCapture::open_default(producer, running);
        assert!(matches!(err, Err(ParleyError::AudioStream(_))));
    }
}
