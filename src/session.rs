//! Per-session mutable state — the single place ordering and dedup
//! decisions read from.
//!
//! [`SessionState`] is owned exclusively by the pipeline task and mutated
//! only on that task (stabilizer and mode-controller paths).  Other code
//! reads it through accessors; it is never shared as a raw mutable
//! reference, so no locking is needed.
//!
//! [`RollingContext`] keeps the last *N* accepted sentences and produces a
//! compact hint string offered to the backend with each window.  The window
//! is cleared automatically after a long silence (topic change) and on a
//! windowing-mode switch (new conversation).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::ContextConfig;
use crate::config::WindowingMode;
use crate::stt::BackendId;

// ---------------------------------------------------------------------------
// RollingContext
// ---------------------------------------------------------------------------

/// Rolling window of recently accepted sentences.
///
/// # Example
/// ```rust
/// use livesub::config::ContextConfig;
/// use livesub::session::RollingContext;
///
/// let mut ctx = RollingContext::new(&ContextConfig::default());
/// ctx.push_sentence("The train left at nine.".to_string());
/// assert!(ctx.hint().is_some());
/// ```
pub struct RollingContext {
    sentences: VecDeque<String>,
    max_sentences: usize,
    last_activity: Instant,
    silence_reset: Duration,
}

impl RollingContext {
    /// Create a rolling context from configuration.
    pub fn new(config: &ContextConfig) -> Self {
        Self {
            sentences: VecDeque::with_capacity(config.sentences + 1),
            max_sentences: config.sentences,
            last_activity: Instant::now(),
            silence_reset: Duration::from_secs(config.reset_silence_secs),
        }
    }

    /// Add an accepted sentence to the rolling window.
    ///
    /// If the elapsed time since the last sentence exceeds the silence-reset
    /// threshold the window is cleared first.  Oldest entries are dropped
    /// once the window exceeds its capacity.
    pub fn push_sentence(&mut self, sentence: String) {
        if self.last_activity.elapsed() > self.silence_reset {
            self.sentences.clear();
        }

        self.sentences.push_back(sentence);

        while self.sentences.len() > self.max_sentences {
            self.sentences.pop_front();
        }

        self.last_activity = Instant::now();
    }

    /// Clear the rolling window immediately.
    pub fn reset(&mut self) {
        self.sentences.clear();
    }

    /// Build the hint string offered to the backend.
    ///
    /// Returns `None` when the window is empty.  Sentences are joined
    /// oldest-first into plain text — backends treat this as a decoding
    /// prompt, not structured data.
    pub fn hint(&self) -> Option<String> {
        if self.sentences.is_empty() {
            return None;
        }
        Some(
            self.sentences
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(" "),
        )
    }

    /// Number of sentences currently held.
    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    /// Returns `true` when the window is empty.
    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Process-wide session state: current mode, active backend identity, the
/// rolling context, and the last accepted text (for duplicate suppression).
pub struct SessionState {
    mode: WindowingMode,
    backend: BackendId,
    context: RollingContext,
    last_final: Option<String>,
}

impl SessionState {
    pub fn new(mode: WindowingMode, backend: BackendId, context: &ContextConfig) -> Self {
        Self {
            mode,
            backend,
            context: RollingContext::new(context),
            last_final: None,
        }
    }

    /// Active windowing mode.
    pub fn mode(&self) -> WindowingMode {
        self.mode
    }

    /// Switch windowing mode.
    ///
    /// Resets the rolling context: a mode switch changes timing assumptions
    /// and is treated as a new conversation.
    pub fn set_mode(&mut self, mode: WindowingMode) {
        if self.mode != mode {
            self.context.reset();
        }
        self.mode = mode;
    }

    /// Identity of the backend currently serving this session.
    pub fn backend(&self) -> &BackendId {
        &self.backend
    }

    /// Record a backend change.  The rolling context survives — only
    /// in-flight results from the old backend are discarded, which the
    /// pipeline handles before calling this.
    pub fn set_backend(&mut self, backend: BackendId) {
        self.backend = backend;
    }

    /// Context hint for the next backend call.
    pub fn context_hint(&self) -> Option<String> {
        self.context.hint()
    }

    /// The most recently accepted (final) text, if any.
    pub fn last_final(&self) -> Option<&str> {
        self.last_final.as_deref()
    }

    /// Record an accepted final sentence: updates duplicate-suppression
    /// state and feeds the rolling context.  Interim events never call this.
    pub fn accept_final(&mut self, text: &str) {
        self.last_final = Some(text.to_string());
        self.context.push_sentence(text.to_string());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_config(sentences: usize) -> ContextConfig {
        ContextConfig {
            sentences,
            reset_silence_secs: 120,
        }
    }

    // ---- RollingContext ----------------------------------------------------

    #[test]
    fn starts_empty() {
        let ctx = RollingContext::new(&ctx_config(3));
        assert!(ctx.is_empty());
        assert_eq!(ctx.hint(), None);
    }

    #[test]
    fn hint_joins_sentences_oldest_first() {
        let mut ctx = RollingContext::new(&ctx_config(3));
        ctx.push_sentence("First sentence.".into());
        ctx.push_sentence("Second sentence.".into());
        assert_eq!(
            ctx.hint().as_deref(),
            Some("First sentence. Second sentence.")
        );
    }

    #[test]
    fn rolling_window_caps_at_max_sentences() {
        let mut ctx = RollingContext::new(&ctx_config(3));
        for i in 0..6 {
            ctx.push_sentence(format!("sentence {i}"));
        }
        assert_eq!(ctx.len(), 3);

        let hint = ctx.hint().unwrap();
        assert!(!hint.contains("sentence 0"));
        assert!(!hint.contains("sentence 2"));
        assert!(hint.contains("sentence 3"));
        assert!(hint.contains("sentence 5"));
    }

    #[test]
    fn reset_clears_window() {
        let mut ctx = RollingContext::new(&ctx_config(3));
        ctx.push_sentence("something".into());
        ctx.reset();
        assert!(ctx.is_empty());
        assert_eq!(ctx.hint(), None);
    }

    // ---- SessionState ------------------------------------------------------

    fn make_session() -> SessionState {
        SessionState::new(
            WindowingMode::Fixed,
            BackendId::new("mock"),
            &ctx_config(3),
        )
    }

    #[test]
    fn accept_final_updates_dedup_state_and_context() {
        let mut session = make_session();
        assert!(session.last_final().is_none());

        session.accept_final("Hello there.");
        assert_eq!(session.last_final(), Some("Hello there."));
        assert_eq!(session.context_hint().as_deref(), Some("Hello there."));
    }

    #[test]
    fn mode_switch_resets_context() {
        let mut session = make_session();
        session.accept_final("Some context.");
        assert!(session.context_hint().is_some());

        session.set_mode(WindowingMode::Boundary);
        assert_eq!(session.mode(), WindowingMode::Boundary);
        assert!(session.context_hint().is_none());
        // last-final dedup state survives a mode switch
        assert_eq!(session.last_final(), Some("Some context."));
    }

    #[test]
    fn same_mode_switch_keeps_context() {
        let mut session = make_session();
        session.accept_final("Some context.");
        session.set_mode(WindowingMode::Fixed);
        assert!(session.context_hint().is_some());
    }

    #[test]
    fn backend_switch_keeps_context() {
        let mut session = make_session();
        session.accept_final("Some context.");

        session.set_backend(BackendId::new("replacement"));
        assert_eq!(session.backend().as_str(), "replacement");
        assert!(session.context_hint().is_some());
    }
}
