//! Text stabilizer — turns per-window backend output into a stable stream
//! of subtitle events.
//!
//! Fixed-size windows cut speech at arbitrary points; naively displaying
//! every window's output produces visible duplication and fragment flicker.
//! This layer converts "whatever the backend said about this slice" into
//! "what should actually be shown to a human":
//!
//! * **Overlap dedup** — consecutive texts from overlapping windows have
//!   the longest shared suffix/prefix word sequence stripped once.
//! * **Exact-duplicate suppression** — a merged candidate identical to the
//!   previously emitted text is dropped (backend decoding loops that
//!   escaped the hallucination filter).
//! * **Sentence buffering** — fragments accumulate until terminal
//!   punctuation flushes a `Final` event; a buffer exceeding the word
//!   threshold emits `Interim` progress events without committing.
//! * **Staleness flush** — a buffer that stops growing is flushed as
//!   `Final` so a trailing sentence without punctuation is not lost.
//!
//! State machine per session: `Empty → Buffering → Emitted → …`, with every
//! emitted event carrying the next strictly monotonic sequence number.

use std::time::Instant;

use serde::Serialize;

use crate::audio::AudioWindow;
use crate::config::StabilizerConfig;
use crate::session::SessionState;

/// Sentence-terminal punctuation for the supported display languages.
const TERMINAL_PUNCTUATION: &[char] = &['.', '!', '?', '…', '。', '！', '？'];

// ---------------------------------------------------------------------------
// StabilizedEvent
// ---------------------------------------------------------------------------

/// Whether an event is provisional or committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Progress signal; the same sentence will produce more text.
    Interim,
    /// Committed subtitle line; never revised afterwards.
    Final,
}

impl EventKind {
    pub fn is_final(&self) -> bool {
        matches!(self, EventKind::Final)
    }
}

/// A subtitle line ready for display.  Immutable; broadcast once, then
/// owned by each subscriber independently.
#[derive(Debug, Clone, Serialize)]
pub struct StabilizedEvent {
    /// Display text.
    pub text: String,
    /// Interim (progress) or final (committed).
    pub kind: EventKind,
    /// Strictly monotonic, gap-free sequence number (starts at 1).
    pub sequence: u64,
    /// Milliseconds from window capture start to event emission.
    pub latency_ms: u64,
    /// Source-language text, when the backend provides it.
    pub source_text: Option<String>,
}

// ---------------------------------------------------------------------------
// StabilizerState
// ---------------------------------------------------------------------------

/// Where the per-session sentence buffer currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilizerState {
    /// Nothing buffered, nothing emitted for the current sentence.
    Empty,
    /// Fragments are accumulating towards a sentence.
    Buffering,
    /// The last sentence was flushed; waiting for new speech.
    Emitted,
}

// ---------------------------------------------------------------------------
// TextStabilizer
// ---------------------------------------------------------------------------

/// Per-session text stabilization state machine.
pub struct TextStabilizer {
    config: StabilizerConfig,
    state: StabilizerState,
    /// Accumulated sentence fragments, space-joined.
    buffer: String,
    /// Source-language fragments accumulated alongside `buffer`.
    source_buffer: Vec<String>,
    /// Wall-clock anchor of the window whose text opened the buffer.
    buffer_anchor: Option<Instant>,
    /// When the last fragment was appended (staleness clock).
    last_fragment_at: Option<Instant>,
    /// Full text of the previous accepted window, for overlap stripping.
    prev_fragment: Option<String>,
    /// Text of the most recently emitted event, for duplicate suppression.
    last_emitted: Option<String>,
    next_sequence: u64,
}

impl TextStabilizer {
    pub fn new(config: StabilizerConfig) -> Self {
        Self {
            config,
            state: StabilizerState::Empty,
            buffer: String::new(),
            source_buffer: Vec::new(),
            buffer_anchor: None,
            last_fragment_at: None,
            prev_fragment: None,
            last_emitted: None,
            next_sequence: 1,
        }
    }

    /// Apply hot-reloaded thresholds.  Buffered text is unaffected.
    pub fn set_config(&mut self, config: StabilizerConfig) {
        self.config = config;
    }

    /// Current state-machine position.
    pub fn state(&self) -> StabilizerState {
        self.state
    }

    /// Current buffer contents (empty between sentences).
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Feed one filtered window text; returns zero or one events.
    ///
    /// `text` must be the hallucination filter's output; an empty string is
    /// not a fragment and leaves the buffer and staleness clock untouched.
    pub fn push(
        &mut self,
        text: &str,
        source_text: Option<&str>,
        window: &AudioWindow,
        session: &mut SessionState,
    ) -> Vec<StabilizedEvent> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        // Strip audio-overlap duplication against the previous window's text.
        let fragment = if window.overlap_ms > 0 {
            match &self.prev_fragment {
                Some(prev) => {
                    strip_overlap(prev, text, self.config.overlap_search_words)
                }
                None => text.to_string(),
            }
        } else {
            text.to_string()
        };
        self.prev_fragment = Some(text.to_string());

        if fragment.is_empty() {
            // The window repeated only audio we already transcribed.
            log::debug!("window text fully covered by overlap: '{text}'");
            return Vec::new();
        }

        let merged = if self.buffer.is_empty() {
            fragment
        } else {
            format!("{} {}", self.buffer, fragment)
        };

        // Backend decoding loop: identical to what we just displayed.
        if self.last_emitted.as_deref() == Some(merged.as_str()) {
            log::debug!("suppressed duplicate of previous emission: '{merged}'");
            return Vec::new();
        }

        self.buffer = merged;
        if let Some(src) = source_text {
            self.source_buffer.push(src.to_string());
        }
        self.buffer_anchor.get_or_insert(window.captured_at);
        self.last_fragment_at = Some(Instant::now());
        self.state = StabilizerState::Buffering;

        if ends_with_terminal(&self.buffer) {
            return vec![self.flush_final(latency_since(window.captured_at), session)];
        }

        if word_count(&self.buffer) > self.config.max_buffer_words {
            let event = StabilizedEvent {
                text: self.buffer.clone(),
                kind: EventKind::Interim,
                sequence: self.take_sequence(),
                latency_ms: latency_since(window.captured_at),
                source_text: self.joined_source(),
            };
            self.last_emitted = Some(event.text.clone());
            // Buffer intentionally kept: interim is progress, not a commit.
            return vec![event];
        }

        Vec::new()
    }

    /// Flush a buffer that has stopped receiving fragments.
    ///
    /// Returns the flush event when the buffer is non-empty and the
    /// staleness timeout has elapsed at `now`; the buffer is empty
    /// afterwards.
    pub fn flush_stale(
        &mut self,
        now: Instant,
        session: &mut SessionState,
    ) -> Option<StabilizedEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let last = self.last_fragment_at?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed.as_secs_f32() < self.config.stale_flush_secs {
            return None;
        }

        log::debug!("stale-flushing buffer after {:.1}s", elapsed.as_secs_f32());
        let latency = self
            .buffer_anchor
            .map(|anchor| now.saturating_duration_since(anchor).as_millis() as u64)
            .unwrap_or(0);
        Some(self.flush_final(latency, session))
    }

    /// Flush the buffer immediately, regardless of staleness.
    ///
    /// Used when the pipeline drains on shutdown so a trailing sentence is
    /// not lost.  Returns `None` when nothing is buffered.
    pub fn flush_now(&mut self, session: &mut SessionState) -> Option<StabilizedEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let latency = self
            .buffer_anchor
            .map(|anchor| anchor.elapsed().as_millis() as u64)
            .unwrap_or(0);
        Some(self.flush_final(latency, session))
    }

    /// Deadline at which [`flush_stale`](Self::flush_stale) would fire, if a
    /// buffer is pending.  The pipeline sleeps until this instant.
    pub fn stale_deadline(&self) -> Option<Instant> {
        if self.buffer.is_empty() {
            return None;
        }
        self.last_fragment_at
            .map(|at| at + std::time::Duration::from_secs_f32(self.config.stale_flush_secs))
    }

    /// Emit the buffer as a final event and reset for the next sentence.
    fn flush_final(&mut self, latency_ms: u64, session: &mut SessionState) -> StabilizedEvent {
        let text = std::mem::take(&mut self.buffer);
        let event = StabilizedEvent {
            kind: EventKind::Final,
            sequence: self.take_sequence(),
            latency_ms,
            source_text: self.joined_source(),
            text,
        };

        session.accept_final(&event.text);
        self.last_emitted = Some(event.text.clone());
        self.source_buffer.clear();
        self.buffer_anchor = None;
        self.last_fragment_at = None;
        self.state = StabilizerState::Emitted;
        event
    }

    fn take_sequence(&mut self) -> u64 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }

    fn joined_source(&self) -> Option<String> {
        if self.source_buffer.is_empty() {
            None
        } else {
            Some(self.source_buffer.join(" "))
        }
    }
}

// ---------------------------------------------------------------------------
// Word-level helpers
// ---------------------------------------------------------------------------

/// Remove from `current` the longest word prefix that is also a word suffix
/// of `previous`, searching at most `max_words` back.
///
/// Comparison is case-insensitive; the surviving words keep their original
/// form.  Idempotent: re-applying to the stripped result removes nothing.
fn strip_overlap(previous: &str, current: &str, max_words: usize) -> String {
    let prev_words: Vec<&str> = previous.split_whitespace().collect();
    let cur_words: Vec<&str> = current.split_whitespace().collect();

    let limit = max_words.min(prev_words.len()).min(cur_words.len());

    for k in (1..=limit).rev() {
        let prev_tail = &prev_words[prev_words.len() - k..];
        let matches = prev_tail
            .iter()
            .zip(&cur_words[..k])
            .all(|(a, b)| a.to_lowercase() == b.to_lowercase());
        if matches {
            return cur_words[k..].join(" ");
        }
    }

    current.to_string()
}

/// Whether `text` ends in sentence-terminal punctuation.
fn ends_with_terminal(text: &str) -> bool {
    text.trim_end()
        .chars()
        .last()
        .is_some_and(|c| TERMINAL_PUNCTUATION.contains(&c))
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn latency_since(anchor: Instant) -> u64 {
    anchor.elapsed().as_millis() as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContextConfig, WindowingMode};
    use crate::stt::BackendId;
    use std::time::Duration;

    fn make_session() -> SessionState {
        SessionState::new(
            WindowingMode::Fixed,
            BackendId::new("mock"),
            &ContextConfig::default(),
        )
    }

    fn make_stabilizer() -> TextStabilizer {
        TextStabilizer::new(StabilizerConfig::default())
    }

    fn window(overlap_ms: u64) -> AudioWindow {
        AudioWindow {
            samples: vec![0.0; 8_000],
            sample_rate: 16_000,
            start_ms: 0,
            overlap_ms,
            captured_at: Instant::now(),
        }
    }

    // ---- strip_overlap -----------------------------------------------------

    #[test]
    fn strip_overlap_removes_shared_words() {
        assert_eq!(
            strip_overlap("hot today I don't", "I don't care", 12),
            "care"
        );
    }

    #[test]
    fn strip_overlap_prefers_longest_match() {
        // both "b c" (2 words) and "c" (1 word) match — the longest wins
        assert_eq!(strip_overlap("a b c", "b c d", 12), "d");
    }

    #[test]
    fn strip_overlap_is_case_insensitive() {
        assert_eq!(strip_overlap("we said Hello", "hello again", 12), "again");
    }

    #[test]
    fn strip_overlap_no_match_keeps_text() {
        assert_eq!(
            strip_overlap("completely different", "new words here", 12),
            "new words here"
        );
    }

    #[test]
    fn strip_overlap_can_consume_entire_fragment() {
        assert_eq!(strip_overlap("one two three", "two three", 12), "");
    }

    #[test]
    fn strip_overlap_is_idempotent() {
        let stripped = strip_overlap("hot today I don't", "I don't care", 12);
        assert_eq!(
            strip_overlap("hot today I don't", &stripped, 12),
            stripped
        );
    }

    #[test]
    fn strip_overlap_respects_search_bound() {
        // Overlap is 3 words but the search is capped at 2 — no match found
        // for k ≤ 2 since "b c" ≠ "a b".
        assert_eq!(
            strip_overlap("x a b c", "a b c tail", 2),
            "a b c tail"
        );
    }

    // ---- overlap merge ----------------------------------------------------

    #[test]
    fn overlapping_windows_merge_without_duplication() {
        let mut st = make_stabilizer();
        let mut session = make_session();

        let events = st.push("hot today I don't", None, &window(0), &mut session);
        assert!(events.is_empty());

        let events = st.push("I don't care", None, &window(500), &mut session);
        assert!(events.is_empty());
        assert_eq!(st.buffer(), "hot today I don't care");
    }

    #[test]
    fn no_overlap_flag_means_no_stripping() {
        let mut st = make_stabilizer();
        let mut session = make_session();

        let _ = st.push("I said no", None, &window(0), &mut session);
        // overlap_ms = 0 → the repeated words are genuine speech
        let _ = st.push("no really", None, &window(0), &mut session);
        assert_eq!(st.buffer(), "I said no no really");
    }

    // ---- sentence buffering ------------------------------------------------

    #[test]
    fn terminal_punctuation_flushes_final() {
        let mut st = make_stabilizer();
        let mut session = make_session();

        let events = st.push("The train leaves at nine.", None, &window(0), &mut session);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Final);
        assert_eq!(events[0].text, "The train leaves at nine.");
        assert_eq!(st.buffer(), "");
        assert_eq!(st.state(), StabilizerState::Emitted);
    }

    #[test]
    fn fragments_accumulate_across_pushes() {
        let mut st = make_stabilizer();
        let mut session = make_session();

        assert!(st
            .push("The train", None, &window(0), &mut session)
            .is_empty());
        let events = st.push("leaves at nine.", None, &window(0), &mut session);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].text, "The train leaves at nine.");
    }

    #[test]
    fn word_threshold_emits_interim_without_clearing() {
        let config = StabilizerConfig {
            max_buffer_words: 4,
            ..StabilizerConfig::default()
        };
        let mut st = TextStabilizer::new(config);
        let mut session = make_session();

        let events = st.push(
            "one two three four five",
            None,
            &window(0),
            &mut session,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Interim);
        assert_eq!(events[0].text, "one two three four five");
        // Buffer kept — interim is progress, not a commit.
        assert_eq!(st.buffer(), "one two three four five");
        assert_eq!(st.state(), StabilizerState::Buffering);
    }

    #[test]
    fn interim_then_final_contains_full_sentence() {
        let config = StabilizerConfig {
            max_buffer_words: 4,
            ..StabilizerConfig::default()
        };
        let mut st = TextStabilizer::new(config);
        let mut session = make_session();

        let interim = st.push(
            "one two three four five",
            None,
            &window(0),
            &mut session,
        );
        assert_eq!(interim[0].kind, EventKind::Interim);

        let fin = st.push("and done.", None, &window(0), &mut session);
        assert_eq!(fin.len(), 1);
        assert_eq!(fin[0].kind, EventKind::Final);
        assert_eq!(fin[0].text, "one two three four five and done.");
    }

    // ---- duplicate suppression ---------------------------------------------

    #[test]
    fn identical_text_twice_yields_one_final() {
        let mut st = make_stabilizer();
        let mut session = make_session();

        let first = st.push("Hello there.", None, &window(0), &mut session);
        assert_eq!(first.len(), 1);

        // Decoder loop: same text again
        let second = st.push("Hello there.", None, &window(0), &mut session);
        assert!(second.is_empty());
        assert_eq!(st.buffer(), "");
    }

    // ---- staleness ---------------------------------------------------------

    #[test]
    fn stale_buffer_flushes_exactly_once() {
        let mut st = make_stabilizer();
        let mut session = make_session();

        let _ = st.push("trailing words without punctuation", None, &window(0), &mut session);

        // Not yet stale
        assert!(st.flush_stale(Instant::now(), &mut session).is_none());

        let later = Instant::now() + Duration::from_secs(5);
        let event = st.flush_stale(later, &mut session).expect("stale flush");
        assert_eq!(event.kind, EventKind::Final);
        assert_eq!(event.text, "trailing words without punctuation");
        assert_eq!(st.buffer(), "");

        // Second flush finds nothing
        assert!(st.flush_stale(later, &mut session).is_none());
    }

    #[test]
    fn empty_buffer_never_flushes() {
        let mut st = make_stabilizer();
        let mut session = make_session();
        let later = Instant::now() + Duration::from_secs(60);
        assert!(st.flush_stale(later, &mut session).is_none());
        assert!(st.stale_deadline().is_none());
    }

    #[test]
    fn stale_deadline_set_while_buffering() {
        let mut st = make_stabilizer();
        let mut session = make_session();
        let _ = st.push("pending", None, &window(0), &mut session);
        assert!(st.stale_deadline().is_some());
    }

    // ---- sequence numbers --------------------------------------------------

    #[test]
    fn sequence_numbers_increase_by_one_without_gaps() {
        let mut st = make_stabilizer();
        let mut session = make_session();

        let mut sequences = Vec::new();
        for text in ["First one.", "Second one.", "Third one."] {
            let events = st.push(text, None, &window(0), &mut session);
            sequences.extend(events.iter().map(|e| e.sequence));
        }
        let _ = st.push("no punctuation yet", None, &window(0), &mut session);
        let later = Instant::now() + Duration::from_secs(5);
        sequences.push(st.flush_stale(later, &mut session).unwrap().sequence);

        assert_eq!(sequences, vec![1, 2, 3, 4]);
    }

    // ---- session interaction -----------------------------------------------

    #[test]
    fn final_updates_session_interim_does_not() {
        let config = StabilizerConfig {
            max_buffer_words: 3,
            ..StabilizerConfig::default()
        };
        let mut st = TextStabilizer::new(config);
        let mut session = make_session();

        let interim = st.push("one two three four", None, &window(0), &mut session);
        assert_eq!(interim[0].kind, EventKind::Interim);
        assert!(session.last_final().is_none());
        assert!(session.context_hint().is_none());

        let fin = st.push("five.", None, &window(0), &mut session);
        assert_eq!(fin[0].kind, EventKind::Final);
        assert_eq!(session.last_final(), Some("one two three four five."));
        assert!(session.context_hint().is_some());
    }

    // ---- misc --------------------------------------------------------------

    #[test]
    fn empty_filtered_text_is_not_a_fragment() {
        let mut st = make_stabilizer();
        let mut session = make_session();

        let _ = st.push("pending words", None, &window(0), &mut session);
        let events = st.push("", None, &window(0), &mut session);
        assert!(events.is_empty());
        assert_eq!(st.buffer(), "pending words");
    }

    #[test]
    fn source_text_accumulates_onto_final() {
        let mut st = make_stabilizer();
        let mut session = make_session();

        let _ = st.push("The train", Some("列車は"), &window(0), &mut session);
        let events = st.push("leaves at nine.", Some("九時に出ます。"), &window(0), &mut session);
        assert_eq!(
            events[0].source_text.as_deref(),
            Some("列車は 九時に出ます。")
        );
    }

    #[test]
    fn fully_overlapped_window_produces_nothing() {
        let mut st = make_stabilizer();
        let mut session = make_session();

        let _ = st.push("one two three", None, &window(0), &mut session);
        let events = st.push("two three", None, &window(500), &mut session);
        assert!(events.is_empty());
        assert_eq!(st.buffer(), "one two three");
    }

    #[test]
    fn state_machine_walk() {
        let mut st = make_stabilizer();
        let mut session = make_session();
        assert_eq!(st.state(), StabilizerState::Empty);

        let _ = st.push("accumulating words", None, &window(0), &mut session);
        assert_eq!(st.state(), StabilizerState::Buffering);

        let _ = st.push("done.", None, &window(0), &mut session);
        assert_eq!(st.state(), StabilizerState::Emitted);
    }
}
