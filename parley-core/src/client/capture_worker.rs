//! Blocking capture loop.
//!
//! ## Stages (per iteration)
//!
//! ```text
//! 1. Drain ring buffer → &[f32] (one chunk per iteration)
//! 2. Resample device rate → 16 kHz
//! 3. Assemble full 4096-sample i16 frames
//! 4. Per frame: RMS + turn detection → activity event,
//!    end_of_turn control when the silence window elapses,
//!    then the frame itself to the transport
//! ```
//!
//! The whole loop runs inside `spawn_blocking`, keeping the tokio executor
//! free for the transport actor and the event loop.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::audio::encode::{FrameAssembler, OUTBOUND_SAMPLE_RATE};
use crate::audio::resample::RateConverter;
use crate::buffering::{CaptureConsumer, Consumer};
use crate::events::AudioActivityEvent;
use crate::protocol::ClientCommand;
use crate::transport::TransportHandle;
use crate::turn::{self, TurnConfig, TurnDetector};

/// All context the worker needs, passed as one struct so the spawning
/// closure stays tidy.
pub struct WorkerContext {
    pub consumer: CaptureConsumer,
    pub running: Arc<AtomicBool>,
    pub transport: TransportHandle,
    pub turn_config: TurnConfig,
    pub activity_tx: broadcast::Sender<AudioActivityEvent>,
    pub seq: Arc<AtomicU64>,
    pub capture_sample_rate: u32,
}

/// Samples drained from the ring per iteration: 20 ms at 48 kHz.
const DRAIN_CHUNK: usize = 960;

/// Sleep when the ring is empty, to avoid busy-waiting a core.
const SLEEP_EMPTY: Duration = Duration::from_millis(5);

/// Runs until `ctx.running` goes false.
pub fn run(mut ctx: WorkerContext) {
    info!(capture_sample_rate = ctx.capture_sample_rate, "capture worker started");

    let mut converter =
        match RateConverter::new(ctx.capture_sample_rate, OUTBOUND_SAMPLE_RATE, DRAIN_CHUNK) {
            Ok(c) => c,
            Err(e) => {
                error!("failed to create resampler: {e}");
                ctx.running.store(false, Ordering::SeqCst);
                return;
            }
        };

    let mut assembler = FrameAssembler::new();
    let mut detector = TurnDetector::new(ctx.turn_config.clone(), Instant::now());
    let mut raw = vec![0f32; DRAIN_CHUNK];
    let mut frames_sent = 0u64;

    loop {
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }

        let n = ctx.consumer.pop_slice(&mut raw);
        if n == 0 {
            std::thread::sleep(SLEEP_EMPTY);
            continue;
        }

        let resampled = converter.process(&raw[..n]);
        if resampled.is_empty() {
            // Partial rubato chunk, waiting for more input.
            continue;
        }

        for frame in assembler.push(&resampled) {
            let now = Instant::now();
            // The detector reads the frame before the transport takes it.
            let level = turn::rms(&frame.samples);
            let end_of_turn = detector.observe(&frame, now);

            let seq = ctx.seq.fetch_add(1, Ordering::Relaxed);
            let _ = ctx.activity_tx.send(AudioActivityEvent {
                seq,
                rms: level,
                end_of_turn,
            });

            if end_of_turn {
                info!("silence window elapsed, signaling end of turn");
                ctx.transport.send_control(ClientCommand::EndOfTurn);
            }

            ctx.transport.send_audio(frame);
            frames_sent += 1;
        }
    }

    if assembler.pending() > 0 {
        debug!(
            samples = assembler.pending(),
            "dropping trailing partial frame at capture stop"
        );
    }
    info!(frames_sent, "capture worker stopped");
}
