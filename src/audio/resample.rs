//! Channel downmixing and sample-rate conversion.
//!
//! The transcription worker requires 16 kHz mono f32 audio, while cpal
//! captures at whatever the device natively runs (commonly 44.1 or 48 kHz,
//! often stereo).  [`to_mono`] averages interleaved channels;
//! [`RateConverter`] bridges the rate gap with a rubato `FastFixedIn`
//! session on the accumulator thread, where allocation is allowed.
//!
//! When the capture rate already equals the target rate the converter is a
//! passthrough and no rubato session is created at all.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

// ---------------------------------------------------------------------------
// to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging channels.
///
/// The output length is `samples.len() / channels`.  Mono input is returned
/// as an owned `Vec` without averaging; zero channels yields an empty vector.
///
/// # Example
///
/// ```rust
/// use push_to_talk::audio::to_mono;
///
/// let stereo = vec![0.4_f32, 0.2, -0.4, -0.2]; // L R L R
/// let mono = to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.3).abs() < 1e-6);
/// assert!((mono[1] + 0.3).abs() < 1e-6);
/// ```
pub fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
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
// RateConverter
// ---------------------------------------------------------------------------

/// Input samples rubato consumes per process call.
const CHUNK_SIZE: usize = 1024;

/// Converts f32 mono audio from the capture rate to the target rate.
///
/// Samples are accumulated internally until a full chunk is available for
/// rubato; any remainder is kept for the next call.  [`reset`](Self::reset)
/// discards that remainder so a stale tail never leaks into the next
/// recording session.
pub struct RateConverter {
    /// `None` when capture rate == target rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    /// Holds partial input chunks between calls.
    input_buf: Vec<f32>,
    /// Pre-allocated rubato output buffer: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// Create a converter from `capture_rate` Hz to `target_rate` Hz.
    ///
    /// Returns an error string when rubato rejects the ratio (never happens
    /// for real device rates; surfaced for completeness).
    pub fn new(capture_rate: u32, target_rate: u32) -> Result<Self, String> {
        if capture_rate == target_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                output_buf: Vec::new(),
            });
        }

        let ratio = target_rate as f64 / capture_rate as f64;

        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio, no dynamic adjustment
            PolynomialDegree::Cubic,
            CHUNK_SIZE,
            1, // mono
        )
        .map_err(|e| format!("resampler init: {e}"))?;

        let max_out = resampler.output_frames_max();
        let output_buf = vec![vec![0f32; max_out]; 1];

        log::debug!("audio: resampling {capture_rate} Hz -> {target_rate} Hz");

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::new(),
            output_buf,
        })
    }

    /// Process incoming mono samples, returning converted output (possibly
    /// empty while a partial chunk accumulates).
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return samples.to_vec();
        };

        self.input_buf.extend_from_slice(samples);

        let mut result = Vec::new();

        while self.input_buf.len() >= CHUNK_SIZE {
            let input_slice = &self.input_buf[..CHUNK_SIZE];

            match resampler.process_into_buffer(&[input_slice], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    result.extend_from_slice(&self.output_buf[0][..produced]);
                }
                Err(e) => {
                    log::error!("audio: resampler process error: {e}");
                }
            }

            self.input_buf.drain(..CHUNK_SIZE);
        }

        result
    }

    /// Discard any partially accumulated input chunk.
    ///
    /// Called on the recording falling edge so the next session starts from
    /// a clean converter state.
    pub fn reset(&mut self) {
        self.input_buf.clear();
    }

    /// `true` when capture rate == target rate and no resampling occurs.
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- to_mono -----------------------------------------------------------

    #[test]
    fn mono_input_passes_through() {
        let samples = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(to_mono(&samples, 1), samples);
    }

    #[test]
    fn stereo_averages_pairs() {
        let samples = vec![1.0_f32, 0.0, 0.0, 1.0];
        assert_eq!(to_mono(&samples, 2), vec![0.5, 0.5]);
    }

    #[test]
    fn zero_channels_yields_empty() {
        assert!(to_mono(&[0.1, 0.2], 0).is_empty());
    }

    #[test]
    fn trailing_partial_frame_is_dropped() {
        // 5 samples at 2 channels: the dangling sample has no pair.
        let samples = vec![0.2_f32; 5];
        assert_eq!(to_mono(&samples, 2).len(), 2);
    }

    // ---- RateConverter -----------------------------------------------------

    #[test]
    fn passthrough_identity() {
        let mut rc = RateConverter::new(16_000, 16_000).unwrap();
        assert!(rc.is_passthrough());
        let samples: Vec<f32> = (0..480).map(|i| i as f32 * 0.001).collect();
        assert_eq!(rc.process(&samples), samples);
    }

    #[test]
    fn downsample_48k_to_16k_has_expected_length() {
        let mut rc = RateConverter::new(48_000, 16_000).unwrap();
        assert!(!rc.is_passthrough());
        // Feed 3 chunks' worth; expect roughly a third back.
        let samples = vec![0.0f32; CHUNK_SIZE * 3];
        let out = rc.process(&samples);
        let expected = CHUNK_SIZE; // 3 chunks / ratio 3
        assert!(
            (out.len() as isize - expected as isize).unsigned_abs() <= 32,
            "output len={} expected≈{}",
            out.len(),
            expected
        );
    }

    #[test]
    fn partial_chunk_accumulates_until_full() {
        let mut rc = RateConverter::new(48_000, 16_000).unwrap();
        let out1 = rc.process(&vec![0.0f32; CHUNK_SIZE / 2]);
        assert!(out1.is_empty(), "partial chunk must not produce output");
        let out2 = rc.process(&vec![0.0f32; CHUNK_SIZE / 2 + 8]);
        assert!(!out2.is_empty(), "second push should complete the chunk");
    }

    #[test]
    fn reset_discards_partial_input() {
        let mut rc = RateConverter::new(48_000, 16_000).unwrap();
        rc.process(&vec![0.0f32; CHUNK_SIZE - 1]);
        rc.reset();
        // One more sample would have completed the old chunk; after reset it
        // only begins a new one.
        let out = rc.process(&vec![0.0f32; 1]);
        assert!(out.is_empty());
    }
}
