//! Sample-rate conversion with a rubato `FastFixedIn` resampler.
//!
//! cpal captures at the device's native rate (typically 44.1/48 kHz) while
//! the wire expects 16 kHz mono. `RateConverter` bridges that gap on the
//! capture worker thread, where allocation is allowed. When the rates
//! already match it is a passthrough and no rubato session exists.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::error;

use crate::error::{ParleyError, Result};

pub struct RateConverter {
    /// `None` in passthrough mode (capture rate == target rate).
    resampler: Option<FastFixedIn<f32>>,
    /// Holds partial input between calls; rubato wants fixed-size chunks.
    input_buf: Vec<f32>,
    chunk_size: usize,
    /// Pre-allocated `[1][output_frames_max]` scratch for rubato.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// # Errors
    /// `ParleyError::AudioDevice` if rubato rejects the configuration.
    pub fn new(capture_rate: u32, target_rate: u32, chunk_size: usize) -> Result<Self> {
        if capture_rate == target_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
            });
        }

        let ratio = target_rate as f64 / capture_rate as f64;
        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio, no dynamic adjustment
            PolynomialDegree::Cubic,
            chunk_size,
            1, // mono
        )
        .map_err(|e| ParleyError::AudioDevice(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        tracing::info!(capture_rate, target_rate, chunk_size, "resampling enabled");

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::new(),
            chunk_size,
            output_buf: vec![vec![0f32; max_out]; 1],
        })
    }

    /// Feeds samples in, returns converted samples out (possibly empty).
    ///
    /// Input accumulates internally until a full chunk is available;
    /// the remainder waits for the next call.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return samples.to_vec();
        };

        self.input_buf.extend_from_slice(samples);

        let mut result = Vec::new();
        while self.input_buf.len() >= self.chunk_size {
            let input = &self.input_buf[..self.chunk_size];
            match resampler.process_into_buffer(&[input], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    result.extend_from_slice(&self.output_buf[0][..produced]);
                }
                Err(e) => error!("resampler process error: {e}"),
            }
            self.input_buf.drain(..self.chunk_size);
        }
        result
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}
