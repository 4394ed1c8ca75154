//! Core speech backend capability trait and request/response types.
//!
//! # Overview
//!
//! [`SpeechBackend`] is the uniform interface the pipeline sees, regardless
//! of whether inference happens in-process or behind an HTTP API.  It is
//! object-safe and `Send + Sync` so implementations can be held behind an
//! `Arc<dyn SpeechBackend>` and hot-swapped at runtime.
//!
//! [`MockBackend`] (available under `#[cfg(test)]`) returns scripted
//! responses — useful for unit-testing the gateway and pipeline without a
//! model file or network access.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::TranscribeTask;

// ---------------------------------------------------------------------------
// BackendId
// ---------------------------------------------------------------------------

/// Identifies a backend instance, e.g. `local:ggml-small` or
/// `remote:whisper-large-v3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendId(String);

impl BackendId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// TranscribeRequest / Transcription
// ---------------------------------------------------------------------------

/// One inference request.
///
/// Borrows the window's samples; a backend must finish (or be cancelled)
/// before the pipeline moves on, so no copy is needed at this layer.
#[derive(Debug, Clone, Copy)]
pub struct TranscribeRequest<'a> {
    /// Mono PCM samples in `[-1.0, 1.0]`.
    pub samples: &'a [f32],
    /// Sample rate of `samples` in Hz.
    pub sample_rate: u32,
    /// Source language ISO-639-1 code, or `"auto"`.
    pub language: &'a str,
    /// Transcribe in the source language or translate to English.
    pub task: TranscribeTask,
    /// Recent accepted sentences, offered as decoding context.  Backends may
    /// ignore it.
    pub context_hint: Option<&'a str>,
}

/// Backend output for one request.
#[derive(Debug, Clone, Default)]
pub struct Transcription {
    /// Candidate text (possibly empty — the model produced nothing).
    pub text: String,
    /// Source-language text, when the backend transcribed before translating.
    pub source_text: Option<String>,
    /// Backend-reported likelihood that the window contained no speech.
    pub no_speech_prob: Option<f32>,
}

// ---------------------------------------------------------------------------
// BackendError
// ---------------------------------------------------------------------------

/// All errors that can arise from a speech backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The model file was not found at the given path.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// Backend initialisation failed (model load, context creation).
    #[error("backend initialisation failed: {0}")]
    Init(String),

    /// HTTP transport or connection error.
    #[error("backend request failed: {0}")]
    Request(String),

    /// The call did not complete within its deadline.
    #[error("backend call timed out")]
    Timeout,

    /// The inference pass itself failed.
    #[error("inference failed: {0}")]
    Inference(String),

    /// The backend's response could not be parsed.
    #[error("failed to parse backend response: {0}")]
    Parse(String),
}

// ---------------------------------------------------------------------------
// SpeechBackend trait
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe capability interface over inference backends.
///
/// # Contract
///
/// - `transcribe` is called **at most once concurrently** per session; the
///   gateway serialises calls, so implementations need no internal queueing.
/// - Implementations must tolerate cancellation (the future being dropped)
///   at any await point.
/// - Errors are returned, never panicked.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Run one inference pass over the request's samples.
    async fn transcribe(&self, req: TranscribeRequest<'_>)
        -> Result<Transcription, BackendError>;

    /// Whether this backend can produce translated (English) output.
    fn supports_translation(&self) -> bool;

    /// Stable identifier for logging and hot-swap bookkeeping.
    fn identity(&self) -> BackendId;
}

// Compile-time assertion: Box<dyn SpeechBackend> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn SpeechBackend>) {}
};

// ---------------------------------------------------------------------------
// MockBackend  (test-only)
// ---------------------------------------------------------------------------

/// A test double that plays back a scripted sequence of responses.
///
/// Each call pops the next scripted response; when the script runs out the
/// last entry repeats.  An optional per-call delay simulates inference
/// latency for timeout tests.
#[cfg(test)]
pub struct MockBackend {
    id: BackendId,
    script: std::sync::Mutex<std::collections::VecDeque<Result<Transcription, BackendError>>>,
    last: Result<Transcription, BackendError>,
    delay: Option<std::time::Duration>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockBackend {
    /// A mock that always returns `Ok` with the given text.
    pub fn ok(id: &str, text: &str) -> Self {
        Self::script(id, vec![Ok(Transcription {
            text: text.to_string(),
            ..Transcription::default()
        })])
    }

    /// A mock that always returns the given error.
    pub fn err(id: &str, error: BackendError) -> Self {
        Self::script(id, vec![Err(error)])
    }

    /// A mock that plays `responses` in order, repeating the last forever.
    pub fn script(id: &str, responses: Vec<Result<Transcription, BackendError>>) -> Self {
        assert!(!responses.is_empty(), "script must not be empty");
        let last = responses.last().cloned().unwrap();
        Self {
            id: BackendId::new(id),
            script: std::sync::Mutex::new(responses.into_iter().collect()),
            last,
            delay: None,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Add a fixed delay before every response.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `transcribe` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl SpeechBackend for MockBackend {
    async fn transcribe(
        &self,
        _req: TranscribeRequest<'_>,
    ) -> Result<Transcription, BackendError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.last.clone())
    }

    fn supports_translation(&self) -> bool {
        true
    }

    fn identity(&self) -> BackendId {
        self.id.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
