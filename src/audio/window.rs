//! Cutting the continuous sample stream into inference windows.
//!
//! [`Windower`] consumes 16 kHz mono samples and produces [`AudioWindow`]s
//! according to the configured [`WindowingMode`]:
//!
//! * **Fixed** — a window every `window - overlap` seconds of new audio.
//!   Each window re-includes the previous window's tail so the backend has
//!   acoustic context across the cut; the duplicated words this produces are
//!   stripped by the text stabilizer, never here.
//! * **Boundary** — accumulate from speech onset (plus a pre-roll tail of
//!   the preceding silence) until a silence gap of `min_silence_secs` ends
//!   the utterance.  Bursts shorter than `min_window_secs` are discarded;
//!   `max_window_secs` forces emission so worst-case latency stays bounded.
//!
//! The windower is a synchronous accumulator: `push` never suspends and a
//! stalled audio source simply stops producing windows — no data is ever
//! fabricated.

use std::time::{Duration, Instant};

use crate::audio::buffer::PrerollBuffer;
use crate::audio::vad::SpeechDetector;
use crate::config::{WindowerConfig, WindowingMode};

// ---------------------------------------------------------------------------
// AudioWindow
// ---------------------------------------------------------------------------

/// A bounded slice of the audio stream submitted to a backend as one
/// inference unit.  Immutable once constructed.
#[derive(Debug, Clone)]
pub struct AudioWindow {
    /// Mono PCM samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Offset of the first sample from the start of the stream, in ms.
    pub start_ms: u64,
    /// How much of this window's head was already part of the previous
    /// window, in ms.  `0` means no overlap.
    pub overlap_ms: u64,
    /// Wall-clock time the first sample of this window was captured.
    /// Anchors the latency measurement on emitted subtitle events.
    pub captured_at: Instant,
}

impl AudioWindow {
    /// Window duration in milliseconds, derived from the sample count.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

// ---------------------------------------------------------------------------
// Windower
// ---------------------------------------------------------------------------

/// Turns a raw sample stream into a sequence of [`AudioWindow`]s.
///
/// # Example
///
/// ```rust
/// use livesub::audio::Windower;
/// use livesub::config::WindowerConfig;
///
/// let mut windower = Windower::new(WindowerConfig::default(), 16_000);
/// let windows = windower.push(&vec![0.0_f32; 16_000]); // 1 s of silence
/// // Fixed mode with a 5 s window: nothing emitted yet.
/// assert!(windows.is_empty());
/// ```
pub struct Windower {
    config: WindowerConfig,
    sample_rate: u32,
    state: ModeState,
}

enum ModeState {
    Fixed(FixedState),
    Boundary(BoundaryState),
}

struct FixedState {
    buf: Vec<f32>,
    /// Absolute stream index of `buf[0]`.
    buf_start: u64,
    /// Wall-clock time `buf[0]` arrived.
    buf_start_at: Option<Instant>,
    emitted_any: bool,
}

struct BoundaryState {
    detector: SpeechDetector,
    /// Samples waiting to be classified (always shorter than one frame
    /// after `push` returns).
    pending: Vec<f32>,
    /// Absolute stream index of `pending[0]`.
    pos: u64,
    speech: Vec<f32>,
    /// Absolute stream index of `speech[0]` (pre-roll included).
    speech_start: u64,
    speech_started_at: Option<Instant>,
    in_speech: bool,
    silence_samples: usize,
    pre_roll: PrerollBuffer,
}

impl Windower {
    /// Create a windower for a stream at `sample_rate` Hz.
    pub fn new(config: WindowerConfig, sample_rate: u32) -> Self {
        let state = Self::fresh_state(&config, sample_rate, 0);
        Self {
            config,
            sample_rate,
            state,
        }
    }

    /// Replace the configuration and reset accumulation state.
    ///
    /// The absolute stream position is carried over so `start_ms` stays
    /// monotonic across a mode switch.  Callers should [`flush`](Self::flush)
    /// first; anything still buffered is discarded here.
    pub fn set_config(&mut self, config: WindowerConfig) {
        let position = self.position();
        self.state = Self::fresh_state(&config, self.sample_rate, position);
        self.config = config;
    }

    /// Active configuration.
    pub fn config(&self) -> &WindowerConfig {
        &self.config
    }

    /// Absolute number of stream samples consumed so far.
    pub fn position(&self) -> u64 {
        match &self.state {
            ModeState::Fixed(s) => s.buf_start + s.buf.len() as u64,
            ModeState::Boundary(s) => s.pos + s.pending.len() as u64,
        }
    }

    fn fresh_state(config: &WindowerConfig, sample_rate: u32, position: u64) -> ModeState {
        match config.mode {
            WindowingMode::Fixed => ModeState::Fixed(FixedState {
                buf: Vec::new(),
                buf_start: position,
                buf_start_at: None,
                emitted_any: false,
            }),
            WindowingMode::Boundary => {
                let pre_roll_samples =
                    (config.pre_roll_ms * sample_rate as u64 / 1000).max(1) as usize;
                ModeState::Boundary(BoundaryState {
                    detector: SpeechDetector::new(config.silence_rms),
                    pending: Vec::new(),
                    pos: position,
                    speech: Vec::new(),
                    speech_start: 0,
                    speech_started_at: None,
                    in_speech: false,
                    silence_samples: 0,
                    pre_roll: PrerollBuffer::new(pre_roll_samples),
                })
            }
        }
    }

    /// Feed new samples; returns zero or more completed windows.
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioWindow> {
        if samples.is_empty() {
            return Vec::new();
        }
        match self.config.mode {
            WindowingMode::Fixed => self.push_fixed(samples),
            WindowingMode::Boundary => self.push_boundary(samples),
        }
    }

    /// Force out whatever is currently buffered, if it amounts to a usable
    /// window.  Used by the mode controller to drain before reconfiguring.
    pub fn flush(&mut self) -> Option<AudioWindow> {
        let sample_rate = self.sample_rate;
        match &mut self.state {
            ModeState::Fixed(state) => {
                let already_seen = if state.emitted_any {
                    self.config.effective_overlap_samples(sample_rate)
                } else {
                    0
                };
                if state.buf.len() <= already_seen {
                    return None;
                }
                let overlap_ms = samples_to_ms(already_seen as u64, sample_rate);
                let window = AudioWindow {
                    samples: std::mem::take(&mut state.buf),
                    sample_rate,
                    start_ms: samples_to_ms(state.buf_start, sample_rate),
                    overlap_ms,
                    captured_at: state.buf_start_at.take().unwrap_or_else(Instant::now),
                };
                state.buf_start += window.samples.len() as u64;
                state.emitted_any = false;
                Some(window)
            }
            ModeState::Boundary(state) => {
                let min_window =
                    secs_to_samples(self.config.min_window_secs, sample_rate);
                boundary_flush(state, sample_rate, min_window)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Fixed mode
    // -----------------------------------------------------------------------

    fn push_fixed(&mut self, samples: &[f32]) -> Vec<AudioWindow> {
        let sample_rate = self.sample_rate;
        let window_samples = secs_to_samples(self.config.window_secs, sample_rate).max(1);
        let overlap_samples = self.config.effective_overlap_samples(sample_rate);
        let stride = window_samples - overlap_samples;

        let ModeState::Fixed(state) = &mut self.state else {
            unreachable!("fixed push with non-fixed state");
        };

        if state.buf.is_empty() {
            state.buf_start_at = Some(Instant::now());
        }
        state.buf.extend_from_slice(samples);

        let mut windows = Vec::new();
        while state.buf.len() >= window_samples {
            let overlap_ms = if state.emitted_any {
                samples_to_ms(overlap_samples as u64, sample_rate)
            } else {
                0
            };

            windows.push(AudioWindow {
                samples: state.buf[..window_samples].to_vec(),
                sample_rate,
                start_ms: samples_to_ms(state.buf_start, sample_rate),
                overlap_ms,
                captured_at: state.buf_start_at.unwrap_or_else(Instant::now),
            });

            state.buf.drain(..stride);
            state.buf_start += stride as u64;
            if let Some(at) = state.buf_start_at.as_mut() {
                *at += Duration::from_secs_f64(stride as f64 / sample_rate as f64);
            }
            state.emitted_any = true;
        }

        windows
    }

    // -----------------------------------------------------------------------
    // Boundary mode
    // -----------------------------------------------------------------------

    fn push_boundary(&mut self, samples: &[f32]) -> Vec<AudioWindow> {
        let sample_rate = self.sample_rate;
        let min_window = secs_to_samples(self.config.min_window_secs, sample_rate);
        let max_window = secs_to_samples(self.config.max_window_secs, sample_rate).max(1);
        let min_silence = secs_to_samples(self.config.min_silence_secs, sample_rate).max(1);

        let ModeState::Boundary(state) = &mut self.state else {
            unreachable!("boundary push with non-boundary state");
        };

        state.pending.extend_from_slice(samples);

        let frame_size = state.detector.frame_size();
        let mut windows = Vec::new();

        while state.pending.len() >= frame_size {
            let frame: Vec<f32> = state.pending.drain(..frame_size).collect();
            let frame_start = state.pos;
            state.pos += frame_size as u64;

            if state.detector.is_speech(&frame) {
                if !state.in_speech {
                    // Speech onset: seed the window with the pre-roll tail.
                    let pre = state.pre_roll.take();
                    state.speech_start = frame_start - pre.len() as u64;
                    state.speech_started_at = Some(started_at_for_preroll(
                        pre.len(),
                        sample_rate,
                    ));
                    state.speech = pre;
                    state.in_speech = true;
                }
                state.speech.extend_from_slice(&frame);
                state.silence_samples = 0;

                if state.speech.len() >= max_window {
                    windows.extend(boundary_flush(state, sample_rate, min_window));
                }
            } else if state.in_speech {
                state.silence_samples += frame_size;
                if state.silence_samples >= min_silence {
                    windows.extend(boundary_flush(state, sample_rate, min_window));
                } else {
                    // Short pause inside an utterance — keep it.
                    state.speech.extend_from_slice(&frame);
                }
            } else {
                state.pre_roll.push(&frame);
            }
        }

        windows
    }
}

/// End the current utterance, emitting it if long enough.
///
/// Resets the boundary state either way: a too-short burst is discarded and
/// accumulation continues from the next speech onset.
fn boundary_flush(
    state: &mut BoundaryState,
    sample_rate: u32,
    min_window: usize,
) -> Option<AudioWindow> {
    state.in_speech = false;
    state.silence_samples = 0;

    let samples = std::mem::take(&mut state.speech);
    let started_at = state.speech_started_at.take();

    if samples.is_empty() {
        return None;
    }
    if samples.len() < min_window {
        log::debug!(
            "discarding {} ms speech burst (below minimum window)",
            samples_to_ms(samples.len() as u64, sample_rate)
        );
        return None;
    }

    Some(AudioWindow {
        start_ms: samples_to_ms(state.speech_start, sample_rate),
        samples,
        sample_rate,
        overlap_ms: 0,
        captured_at: started_at.unwrap_or_else(Instant::now),
    })
}

/// Wall-clock anchor for a window whose head is `pre_roll_len` samples of
/// already-captured audio.
fn started_at_for_preroll(pre_roll_len: usize, sample_rate: u32) -> Instant {
    let now = Instant::now();
    let pre = Duration::from_secs_f64(pre_roll_len as f64 / sample_rate as f64);
    now.checked_sub(pre).unwrap_or(now)
}

fn secs_to_samples(secs: f32, sample_rate: u32) -> usize {
    (secs * sample_rate as f32) as usize
}

fn samples_to_ms(samples: u64, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    samples * 1000 / sample_rate as u64
}

impl WindowerConfig {
    /// Overlap in samples, clamped so the emission stride stays positive.
    fn effective_overlap_samples(&self, sample_rate: u32) -> usize {
        let window = secs_to_samples(self.window_secs, sample_rate).max(1);
        let overlap = secs_to_samples(self.overlap_secs, sample_rate);
        if overlap >= window {
            log::warn!(
                "overlap ({}s) >= window ({}s); ignoring overlap",
                self.overlap_secs,
                self.window_secs
            );
            0
        } else {
            overlap
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16_000;

    fn fixed_config(window_secs: f32, overlap_secs: f32) -> WindowerConfig {
        WindowerConfig {
            mode: WindowingMode::Fixed,
            window_secs,
            overlap_secs,
            ..WindowerConfig::default()
        }
    }

    fn boundary_config() -> WindowerConfig {
        WindowerConfig {
            mode: WindowingMode::Boundary,
            min_window_secs: 0.05,
            max_window_secs: 0.5,
            min_silence_secs: 0.06,
            pre_roll_ms: 30,
            silence_rms: 0.02,
            ..WindowerConfig::default()
        }
    }

    fn speech_frames(n: usize) -> Vec<f32> {
        vec![0.5_f32; n * 480]
    }

    fn silence_frames(n: usize) -> Vec<f32> {
        vec![0.0_f32; n * 480]
    }

    // ---- fixed mode --------------------------------------------------------

    #[test]
    fn fixed_emits_on_schedule() {
        // 0.5 s window, 0.1 s overlap → stride 0.4 s
        let mut w = Windower::new(fixed_config(0.5, 0.1), RATE);

        let windows = w.push(&vec![0.1_f32; 16_000]); // 1 s
        assert_eq!(windows.len(), 2);

        assert_eq!(windows[0].samples.len(), 8_000);
        assert_eq!(windows[0].start_ms, 0);
        assert_eq!(windows[0].overlap_ms, 0); // first window has no overlap

        assert_eq!(windows[1].samples.len(), 8_000);
        assert_eq!(windows[1].start_ms, 400);
        assert_eq!(windows[1].overlap_ms, 100);
    }

    #[test]
    fn fixed_overlap_re_includes_previous_tail() {
        let mut w = Windower::new(fixed_config(0.5, 0.1), RATE);

        // Distinguishable signal: sample value = index / 100_000
        let input: Vec<f32> = (0..16_000).map(|i| i as f32 / 100_000.0).collect();
        let windows = w.push(&input);

        // Second window must start 0.1 s before the first ended.
        let first_end = windows[0].samples.last().copied().unwrap();
        let second = &windows[1].samples;
        let overlap_samples = 1_600; // 0.1 s
        assert!((second[overlap_samples - 1] - first_end).abs() < 1e-9);
    }

    #[test]
    fn fixed_emits_even_on_silence() {
        let mut w = Windower::new(fixed_config(0.5, 0.0), RATE);
        let windows = w.push(&vec![0.0_f32; 8_000]);
        assert_eq!(windows.len(), 1);
    }

    #[test]
    fn fixed_partial_buffer_emits_nothing() {
        let mut w = Windower::new(fixed_config(0.5, 0.1), RATE);
        assert!(w.push(&vec![0.1_f32; 4_000]).is_empty());
    }

    #[test]
    fn fixed_flush_emits_remainder() {
        let mut w = Windower::new(fixed_config(0.5, 0.1), RATE);
        let _ = w.push(&vec![0.1_f32; 9_000]); // one window out, 2.6k kept

        let tail = w.flush().expect("remainder window");
        assert!(tail.samples.len() > 1_600); // more than just the overlap tail
        assert!(w.flush().is_none());
    }

    #[test]
    fn fixed_flush_on_empty_is_none() {
        let mut w = Windower::new(fixed_config(0.5, 0.1), RATE);
        assert!(w.flush().is_none());
    }

    #[test]
    fn fixed_degenerate_overlap_is_ignored() {
        // overlap >= window would make the stride zero; it is dropped
        let mut w = Windower::new(fixed_config(0.5, 0.5), RATE);
        let windows = w.push(&vec![0.1_f32; 16_000]);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].overlap_ms, 0);
    }

    // ---- boundary mode -----------------------------------------------------

    #[test]
    fn boundary_silence_only_emits_nothing() {
        let mut w = Windower::new(boundary_config(), RATE);
        assert!(w.push(&silence_frames(40)).is_empty());
    }

    #[test]
    fn boundary_emits_after_silence_gap() {
        let mut w = Windower::new(boundary_config(), RATE);

        let mut input = silence_frames(2);
        input.extend(speech_frames(5));
        input.extend(silence_frames(3));
        let windows = w.push(&input);

        assert_eq!(windows.len(), 1);
        let win = &windows[0];
        // pre-roll (1 frame) + speech (5 frames) + kept short pause (1 frame)
        assert_eq!(win.samples.len(), 7 * 480);
        assert_eq!(win.overlap_ms, 0);
        // window starts one pre-roll frame before speech onset
        assert_eq!(win.start_ms, 480 * 1000 / RATE as u64);
    }

    #[test]
    fn boundary_short_burst_is_discarded() {
        let mut w = Windower::new(boundary_config(), RATE);

        // one 30 ms frame of speech < 50 ms minimum
        let mut input = speech_frames(1);
        input.extend(silence_frames(3));
        assert!(w.push(&input).is_empty());
    }

    #[test]
    fn boundary_max_duration_forces_emission() {
        let config = WindowerConfig {
            max_window_secs: 0.09, // 3 frames
            ..boundary_config()
        };
        let mut w = Windower::new(config, RATE);

        // continuous speech, never a silence gap
        let windows = w.push(&speech_frames(10));
        assert_eq!(windows.len(), 3);
        for win in &windows {
            assert_eq!(win.samples.len(), 3 * 480);
        }
    }

    #[test]
    fn boundary_flush_emits_in_progress_utterance() {
        let mut w = Windower::new(boundary_config(), RATE);
        assert!(w.push(&speech_frames(5)).is_empty()); // still accumulating

        let win = w.flush().expect("in-progress utterance");
        assert_eq!(win.samples.len(), 5 * 480);
        assert!(w.flush().is_none());
    }

    // ---- reconfiguration ---------------------------------------------------

    #[test]
    fn set_config_switches_mode_and_keeps_position() {
        let mut w = Windower::new(fixed_config(0.5, 0.0), RATE);
        let _ = w.push(&vec![0.1_f32; 8_000]);
        let pos_before = w.position();

        w.set_config(boundary_config());
        assert_eq!(w.position(), pos_before);

        // Windows produced after the switch continue the stream timeline.
        let mut input = speech_frames(5);
        input.extend(silence_frames(3));
        let windows = w.push(&input);
        assert_eq!(windows.len(), 1);
        assert!(windows[0].start_ms >= 500);
    }

    #[test]
    fn duration_ms_derived_from_samples() {
        let win = AudioWindow {
            samples: vec![0.0; 8_000],
            sample_rate: RATE,
            start_ms: 0,
            overlap_ms: 0,
            captured_at: Instant::now(),
        };
        assert_eq!(win.duration_ms(), 500);
    }
}
