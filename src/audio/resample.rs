//! Audio resampling and channel mixing utilities.
//!
//! Speech backends require **16 kHz mono `f32`** audio.  This module provides
//! the two conversion steps applied to every captured buffer:
//!
//! 1. [`stereo_to_mono`] — downmix any number of interleaved channels to mono.
//! 2. [`StreamResampler`] — FFT-based streaming resampler (`rubato`) from the
//!    device's native rate to the pipeline rate, with anti-aliasing.

use rubato::{FftFixedInOut, Resampler, ResamplerConstructionError};
use std::collections::VecDeque;
use thiserror::Error;

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// The output length is `samples.len() / channels`.
///
/// * If `channels == 1` the input slice is returned as an owned `Vec` with no
///   averaging (fast path — avoids an extra allocation when already mono).
/// * If `channels == 0` an empty vector is returned.
///
/// # Example
///
/// ```rust
/// use livesub::audio::stereo_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, -0.2]; // L R L R
/// let mono = stereo_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// ```
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// ResampleError
// ---------------------------------------------------------------------------

/// Errors raised while resampling a stream.
#[derive(Debug, Error)]
pub enum ResampleError {
    /// The underlying FFT resampler rejected a processing step.
    #[error("failed to resample input samples: {0}")]
    Process(#[from] rubato::ResampleError),
}

// ---------------------------------------------------------------------------
// StreamResampler
// ---------------------------------------------------------------------------

/// Streaming mono resampler for arbitrary input buffer sizes.
///
/// The FFT engine consumes fixed-size input blocks, so incoming samples are
/// queued in a FIFO and processed whenever a full block is available.
/// Remaining samples stay queued for the next call — no audio is dropped at
/// buffer boundaries.
///
/// When the source rate already equals the target rate the input is passed
/// through untouched.
pub struct StreamResampler {
    inner: Option<FftFixedInOut<f32>>,
    queue: VecDeque<f32>,
    input_buffer: Vec<f32>,
    output_buffer: Vec<f32>,
}

impl StreamResampler {
    /// Processing block size handed to the FFT engine, in input frames.
    const BLOCK_SIZE: usize = 1024;

    /// Create a resampler converting `source_rate` Hz mono to `target_rate`.
    ///
    /// Allocates internal buffers; call during initialisation, not from the
    /// audio callback thread.
    ///
    /// # Errors
    ///
    /// Returns [`ResamplerConstructionError`] when the rate pair cannot be
    /// realised by the FFT engine.
    pub fn new(source_rate: u32, target_rate: u32) -> Result<Self, ResamplerConstructionError> {
        if source_rate == target_rate {
            return Ok(Self {
                inner: None,
                queue: VecDeque::new(),
                input_buffer: Vec::new(),
                output_buffer: Vec::new(),
            });
        }

        let inner = FftFixedInOut::new(
            source_rate as usize,
            target_rate as usize,
            Self::BLOCK_SIZE,
            1, // mono
        )?;

        let input_buffer = vec![0.0; inner.input_frames_max()];
        let output_buffer = vec![0.0; inner.output_frames_max()];

        Ok(Self {
            inner: Some(inner),
            queue: VecDeque::new(),
            input_buffer,
            output_buffer,
        })
    }

    /// Feed `input` and return whatever resampled output became available.
    ///
    /// May return an empty vector while the internal queue fills towards a
    /// complete block.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>, ResampleError> {
        let Some(inner) = self.inner.as_mut() else {
            // Pass-through: source and target rates are identical.
            return Ok(input.to_vec());
        };

        self.queue.extend(input);
        let mut output = Vec::new();

        loop {
            let wanted = inner.input_frames_next();
            if self.queue.len() < wanted {
                break;
            }

            if self.input_buffer.len() < wanted {
                self.input_buffer.resize(wanted, 0.0);
            }
            for slot in self.input_buffer[..wanted].iter_mut() {
                *slot = self.queue.pop_front().unwrap_or(0.0);
            }

            let wave_in = &[&self.input_buffer[..wanted]];
            let wave_out = &mut [&mut self.output_buffer[..]];
            let (_, written) = inner.process_into_buffer(wave_in, wave_out, None)?;

            output.extend_from_slice(&self.output_buffer[..written]);
        }

        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- stereo_to_mono ----------------------------------------------------

    #[test]
    fn stereo_to_mono_already_mono() {
        let input = vec![0.1_f32, 0.2, 0.3];
        let out = stereo_to_mono(&input, 1);
        assert_eq!(out, input);
    }

    #[test]
    fn stereo_to_mono_two_channel() {
        let input = vec![1.0_f32, -1.0, 0.5, 0.5];
        let out = stereo_to_mono(&input, 2);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn stereo_to_mono_zero_channels() {
        let out = stereo_to_mono(&[1.0_f32, 2.0], 0);
        assert!(out.is_empty());
    }

    // ---- StreamResampler ---------------------------------------------------

    #[test]
    fn passthrough_when_rates_equal() {
        let mut rs = StreamResampler::new(16_000, 16_000).expect("construct");
        let input = vec![0.25_f32; 333];
        let out = rs.process(&input).expect("process");
        assert_eq!(out, input);
    }

    #[test]
    fn downsample_48k_produces_one_third_length() {
        let mut rs = StreamResampler::new(48_000, 16_000).expect("construct");

        // Feed 3 seconds of DC signal in uneven chunks; total output should
        // approach 1/3 of the input length (minus what stays queued).
        let mut total_in = 0usize;
        let mut total_out = 0usize;
        for chunk_len in [1000usize, 3000, 47_000, 93_000] {
            let input = vec![0.5_f32; chunk_len];
            total_in += chunk_len;
            total_out += rs.process(&input).expect("process").len();
        }

        let expected = total_in / 3;
        // Allow one FFT block of slack for samples still queued inside.
        assert!(
            total_out <= expected && total_out >= expected.saturating_sub(2048),
            "in={total_in} out={total_out} expected≈{expected}"
        );
    }

    #[test]
    fn small_input_is_buffered_not_lost() {
        let mut rs = StreamResampler::new(48_000, 16_000).expect("construct");

        // Less than one block: nothing comes out yet...
        let out = rs.process(&vec![0.5_f32; 100]).expect("process");
        assert!(out.is_empty());

        // ...but the queued samples are included once a block completes.
        let out = rs.process(&vec![0.5_f32; 10_000]).expect("process");
        assert!(!out.is_empty());
    }

    #[test]
    fn dc_signal_amplitude_preserved() {
        let mut rs = StreamResampler::new(48_000, 16_000).expect("construct");
        let out = rs.process(&vec![0.5_f32; 48_000]).expect("process");

        // Skip the filter's warm-up transient at the start.
        let steady = &out[out.len() / 2..];
        for &s in steady {
            assert!((s - 0.5).abs() < 0.05, "amplitude drift: {s}");
        }
    }
}
