//! Simple energy-based Voice Activity Detection (VAD).
//!
//! [`SpeechDetector`] classifies fixed-size frames of 16 kHz mono audio as
//! *speech* or *silence* by RMS amplitude.  The boundary-mode windower uses
//! it to find utterance boundaries; fixed mode does not consult it at all
//! (silence artifacts from fixed windows are handled downstream by the
//! hallucination filter).
//!
//! ## Algorithm
//!
//! Audio is split into 30 ms frames (480 samples @ 16 kHz).  A frame is
//! classified as *speech* when its RMS amplitude exceeds the configured
//! threshold.  This deliberately errs on the side of classifying noise as
//! speech — a false speech frame only extends a window; a false silence
//! frame would cut a sentence in half.

/// Samples per classification frame at 16 kHz (30 ms).
pub const FRAME_SAMPLES: usize = 480;

// ---------------------------------------------------------------------------
// SpeechDetector
// ---------------------------------------------------------------------------

/// Energy-based frame classifier.
///
/// # Example
///
/// ```rust
/// use livesub::audio::SpeechDetector;
///
/// // 0.02 RMS threshold — rejects low-level room noise
/// let vad = SpeechDetector::new(0.02);
///
/// assert!(!vad.is_speech(&vec![0.0_f32; 480]));
/// assert!(vad.is_speech(&vec![0.5_f32; 480]));
/// ```
#[derive(Debug, Clone)]
pub struct SpeechDetector {
    /// RMS amplitude threshold; frames below this are considered silence.
    rms_threshold: f32,
    /// Frame size in samples.
    frame_size: usize,
}

impl SpeechDetector {
    /// Create a [`SpeechDetector`] with the given RMS threshold.
    ///
    /// `rms_threshold` should be in `[0.0, 1.0]`.  A typical value is `0.02`;
    /// use `0.03`–`0.05` in noisy environments.
    pub fn new(rms_threshold: f32) -> Self {
        Self {
            rms_threshold,
            frame_size: FRAME_SAMPLES,
        }
    }

    /// Create a [`SpeechDetector`] with a custom frame size.
    ///
    /// Useful for sample rates other than 16 kHz.
    pub fn with_frame_size(rms_threshold: f32, frame_size: usize) -> Self {
        assert!(frame_size > 0, "frame_size must be > 0");
        Self {
            rms_threshold,
            frame_size,
        }
    }

    /// Frame size in samples.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// RMS threshold currently in use.
    pub fn threshold(&self) -> f32 {
        self.rms_threshold
    }

    /// Root-mean-square amplitude of `frame`.
    pub fn rms(frame: &[f32]) -> f32 {
        if frame.is_empty() {
            return 0.0;
        }
        let mean_sq: f32 = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
        mean_sq.sqrt()
    }

    /// Returns `true` when the frame contains voice activity.
    pub fn is_speech(&self, frame: &[f32]) -> bool {
        Self::rms(frame) > self.rms_threshold
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_frame_is_not_speech() {
        let vad = SpeechDetector::new(0.02);
        assert!(!vad.is_speech(&vec![0.0_f32; FRAME_SAMPLES]));
    }

    #[test]
    fn loud_frame_is_speech() {
        let vad = SpeechDetector::new(0.02);
        assert!(vad.is_speech(&vec![0.5_f32; FRAME_SAMPLES]));
    }

    #[test]
    fn frame_just_below_threshold_is_silence() {
        let vad = SpeechDetector::new(0.02);
        // Constant signal → RMS equals the amplitude
        assert!(!vad.is_speech(&vec![0.019_f32; FRAME_SAMPLES]));
    }

    #[test]
    fn empty_frame_is_silence() {
        let vad = SpeechDetector::new(0.02);
        assert!(!vad.is_speech(&[]));
    }

    #[test]
    fn rms_of_constant_signal() {
        let rms = SpeechDetector::rms(&vec![0.5_f32; 100]);
        assert!((rms - 0.5).abs() < 1e-6);
    }

    #[test]
    fn threshold_getter() {
        let vad = SpeechDetector::new(0.05);
        assert!((vad.threshold() - 0.05).abs() < 1e-7);
    }

    #[test]
    #[should_panic(expected = "frame_size must be > 0")]
    fn zero_frame_size_panics() {
        SpeechDetector::with_frame_size(0.02, 0);
    }
}
