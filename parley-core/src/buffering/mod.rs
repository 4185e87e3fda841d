//! Lock-free hand-off between the audio callback and the capture worker.
//!
//! The cpal input callback runs on a realtime OS thread and must never block
//! or allocate, so samples cross to the worker through a single-producer
//! single-consumer ring buffer.

mod frame;

pub use frame::AudioFrame;

use ringbuf::{traits::Split, HeapRb};

// Re-exported so callers can use push_slice / pop_slice without naming ringbuf.
pub use ringbuf::traits::{Consumer, Producer};

/// Ring capacity in f32 samples. At 48 kHz mono this is ~21 s of headroom,
/// far more than the worker's drain cadence ever needs.
pub const RING_CAPACITY: usize = 1 << 20;

pub type CaptureProducer = ringbuf::HeapProd<f32>;
pub type CaptureConsumer = ringbuf::HeapCons<f32>;

/// Creates the SPSC ring shared between the capture callback (producer)
/// and the capture worker (consumer).
pub fn create_capture_ring() -> (CaptureProducer, CaptureConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_passes_samples_in_order() {
        let (mut prod, mut cons) = create_capture_ring();
        let input: Vec<f32> = (0..512).map(|i| i as f32 / 512.0).collect();
        let pushed = prod.push_slice(&input);
        assert_eq!(pushed, input.len());

        let mut out = vec![0.0f32; 512];
        let popped = cons.pop_slice(&mut out);
        assert_eq!(popped, 512);
        assert_eq!(out, input);
    }

    #[test]
    fn ring_reports_empty_after_drain() {
        let (mut prod, mut cons) = create_capture_ring();
        prod.push_slice(&[0.1, 0.2, 0.3]);
        let mut out = [0.0f32; 8];
        assert_eq!(cons.pop_slice(&mut out), 3);
        assert_eq!(cons.pop_slice(&mut out), 0);
    }
}
