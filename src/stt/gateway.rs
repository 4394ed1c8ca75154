//! Backend gateway — single-in-flight call policy, timeouts, and fallback.
//!
//! [`BackendGateway`] sits between the pipeline and whichever
//! [`SpeechBackend`] is active.  It never propagates an error upward:
//! every window produces a [`RawResult`], with an error tag and empty text
//! when the call failed.  Three consecutive failures switch to the
//! configured secondary backend; with no secondary the gateway reports
//! itself degraded and keeps emitting empty results until the backend
//! recovers.
//!
//! The at-most-one-in-flight guarantee is structural: `transcribe_window`
//! takes `&mut self` and the single pipeline task awaits each call before
//! issuing the next, so backend calls can never race or return out of
//! order.  Queueing of windows that become ready during a call happens
//! upstream in the pipeline's bounded window queue.

use std::sync::Arc;
use std::time::Duration;

use crate::audio::AudioWindow;
use crate::config::{BackendConfig, TranscribeTask};
use crate::stt::backend::{BackendId, SpeechBackend, TranscribeRequest};

/// Consecutive failures before falling back to the secondary backend.
const FALLBACK_AFTER: u32 = 3;

// ---------------------------------------------------------------------------
// RawResult
// ---------------------------------------------------------------------------

/// Gateway output for one [`AudioWindow`].
///
/// Produced for every window, error or not; consumed by the hallucination
/// filter and then discarded.
#[derive(Debug, Clone)]
pub struct RawResult {
    /// Candidate text; empty when the model produced nothing or the call
    /// failed.
    pub text: String,
    /// Source-language text, when the backend provides it.
    pub source_text: Option<String>,
    /// Backend-reported no-speech likelihood, when available.
    pub no_speech_prob: Option<f32>,
    /// The window this result was produced from.
    pub window: AudioWindow,
    /// Which backend produced it.
    pub backend: BackendId,
    /// Error tag when the call failed; `None` on success.
    pub error: Option<String>,
}

impl RawResult {
    /// Whether this result records a backend failure.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

// ---------------------------------------------------------------------------
// BackendGateway
// ---------------------------------------------------------------------------

/// Uniform front over the active speech backend with failure handling.
pub struct BackendGateway {
    primary: Arc<dyn SpeechBackend>,
    secondary: Option<Arc<dyn SpeechBackend>>,
    on_secondary: bool,
    consecutive_errors: u32,
    degraded: bool,
    timeout: Duration,
    language: String,
    task: TranscribeTask,
}

impl BackendGateway {
    /// Build a gateway over `primary`, with call parameters from `config`.
    pub fn new(
        primary: Arc<dyn SpeechBackend>,
        secondary: Option<Arc<dyn SpeechBackend>>,
        config: &BackendConfig,
    ) -> Self {
        Self {
            primary,
            secondary,
            on_secondary: false,
            consecutive_errors: 0,
            degraded: false,
            timeout: Duration::from_secs(config.timeout_secs),
            language: config.language.clone(),
            task: config.task,
        }
    }

    /// Identity of the backend the next call will use.
    pub fn identity(&self) -> BackendId {
        self.active().identity()
    }

    /// `true` while all configured backends are failing repeatedly.
    ///
    /// This is the only condition the control surface presents as a
    /// user-visible failure.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Replace the primary backend (hot-swap).
    ///
    /// The caller guarantees no call is in flight (it holds `&mut self`),
    /// so the swap is atomic from the pipeline's point of view.  Error
    /// bookkeeping resets; the next window uses the new backend.
    pub fn swap(&mut self, backend: Arc<dyn SpeechBackend>) {
        log::info!(
            "backend swap: {} -> {}",
            self.identity(),
            backend.identity()
        );
        self.primary = backend;
        self.on_secondary = false;
        self.consecutive_errors = 0;
        self.degraded = false;
    }

    /// Apply hot-reloaded call parameters (timeout, language, task).
    pub fn apply_settings(&mut self, config: &BackendConfig) {
        self.timeout = Duration::from_secs(config.timeout_secs);
        self.language = config.language.clone();
        self.task = config.task;
    }

    fn active(&self) -> &Arc<dyn SpeechBackend> {
        if self.on_secondary {
            self.secondary.as_ref().unwrap_or(&self.primary)
        } else {
            &self.primary
        }
    }

    /// Submit one window to the active backend.
    ///
    /// Holding `&mut self` across the await is what enforces the
    /// at-most-one-in-flight policy.
    pub async fn transcribe_window(
        &mut self,
        window: AudioWindow,
        context_hint: Option<&str>,
    ) -> RawResult {
        let backend = Arc::clone(self.active());
        let backend_id = backend.identity();

        let request = TranscribeRequest {
            samples: &window.samples,
            sample_rate: window.sample_rate,
            language: &self.language,
            task: self.task,
            context_hint,
        };

        let outcome = tokio::time::timeout(self.timeout, backend.transcribe(request)).await;

        match outcome {
            Ok(Ok(transcription)) => {
                if self.degraded {
                    log::info!("backend {backend_id} recovered");
                }
                self.consecutive_errors = 0;
                self.degraded = false;
                RawResult {
                    text: transcription.text,
                    source_text: transcription.source_text,
                    no_speech_prob: transcription.no_speech_prob,
                    window,
                    backend: backend_id,
                    error: None,
                }
            }
            Ok(Err(e)) => self.failure(window, backend_id, e.to_string()),
            Err(_) => self.failure(window, backend_id, "backend call timed out".into()),
        }
    }

    /// Record a failed call and produce its empty-text result.
    fn failure(&mut self, window: AudioWindow, backend: BackendId, tag: String) -> RawResult {
        self.consecutive_errors += 1;
        log::warn!(
            "backend {backend} error ({}/{FALLBACK_AFTER}): {tag}",
            self.consecutive_errors
        );

        if self.consecutive_errors >= FALLBACK_AFTER {
            if !self.on_secondary && self.secondary.is_some() {
                self.on_secondary = true;
                self.consecutive_errors = 0;
                log::warn!(
                    "falling back to secondary backend {}",
                    self.identity()
                );
            } else if !self.degraded {
                self.degraded = true;
                log::error!("all configured backends failing; pipeline degraded");
            }
        }

        RawResult {
            text: String::new(),
            source_text: None,
            no_speech_prob: None,
            window,
            backend,
            error: Some(tag),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stt::backend::{BackendError, MockBackend, Transcription};
    use std::time::Instant;

    fn make_window() -> AudioWindow {
        AudioWindow {
            samples: vec![0.0_f32; 1_000],
            sample_rate: 16_000,
            start_ms: 0,
            overlap_ms: 0,
            captured_at: Instant::now(),
        }
    }

    fn config_with_timeout(timeout_secs: u64) -> BackendConfig {
        BackendConfig {
            timeout_secs,
            ..BackendConfig::default()
        }
    }

    fn ok_response(text: &str) -> Result<Transcription, BackendError> {
        Ok(Transcription {
            text: text.into(),
            ..Transcription::default()
        })
    }

    fn err_response() -> Result<Transcription, BackendError> {
        Err(BackendError::Inference("boom".into()))
    }

    #[tokio::test]
    async fn success_produces_clean_result() {
        let primary = Arc::new(MockBackend::ok("primary", "hello"));
        let mut gateway = BackendGateway::new(primary, None, &config_with_timeout(5));

        let result = gateway.transcribe_window(make_window(), None).await;
        assert_eq!(result.text, "hello");
        assert!(!result.is_error());
        assert_eq!(result.backend.as_str(), "primary");
        assert!(!gateway.is_degraded());
    }

    #[tokio::test]
    async fn error_produces_empty_tagged_result_not_panic() {
        let primary = Arc::new(MockBackend::err(
            "primary",
            BackendError::Inference("boom".into()),
        ));
        let mut gateway = BackendGateway::new(primary, None, &config_with_timeout(5));

        let result = gateway.transcribe_window(make_window(), None).await;
        assert!(result.text.is_empty());
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn three_errors_fall_back_to_secondary() {
        let primary = Arc::new(MockBackend::err(
            "primary",
            BackendError::Inference("boom".into()),
        ));
        let secondary = Arc::new(MockBackend::ok("secondary", "rescued"));
        let mut gateway = BackendGateway::new(
            primary,
            Some(secondary.clone() as Arc<dyn SpeechBackend>),
            &config_with_timeout(5),
        );

        for _ in 0..3 {
            let result = gateway.transcribe_window(make_window(), None).await;
            assert!(result.is_error());
            assert_eq!(result.backend.as_str(), "primary");
        }

        // Fourth call goes to the secondary.
        let result = gateway.transcribe_window(make_window(), None).await;
        assert_eq!(result.backend.as_str(), "secondary");
        assert_eq!(result.text, "rescued");
        assert!(!gateway.is_degraded());
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn no_secondary_sets_degraded_until_recovery() {
        let primary = Arc::new(MockBackend::script(
            "primary",
            vec![
                err_response(),
                err_response(),
                err_response(),
                ok_response("back"),
            ],
        ));
        let mut gateway = BackendGateway::new(primary, None, &config_with_timeout(5));

        for _ in 0..3 {
            let _ = gateway.transcribe_window(make_window(), None).await;
        }
        assert!(gateway.is_degraded());

        // Pipeline keeps going; recovery clears the flag.
        let result = gateway.transcribe_window(make_window(), None).await;
        assert_eq!(result.text, "back");
        assert!(!gateway.is_degraded());
    }

    #[tokio::test]
    async fn timeout_is_treated_as_backend_error() {
        let primary = Arc::new(
            MockBackend::ok("primary", "too late")
                .with_delay(std::time::Duration::from_millis(200)),
        );
        let mut gateway = BackendGateway::new(primary, None, &config_with_timeout(5));
        gateway.timeout = std::time::Duration::from_millis(10);

        let result = gateway.transcribe_window(make_window(), None).await;
        assert!(result.is_error());
        assert!(result.text.is_empty());
        assert!(result.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn swap_installs_new_backend_and_resets_state() {
        let primary = Arc::new(MockBackend::err(
            "primary",
            BackendError::Inference("boom".into()),
        ));
        let mut gateway = BackendGateway::new(primary, None, &config_with_timeout(5));

        for _ in 0..3 {
            let _ = gateway.transcribe_window(make_window(), None).await;
        }
        assert!(gateway.is_degraded());

        gateway.swap(Arc::new(MockBackend::ok("replacement", "fresh")));
        assert!(!gateway.is_degraded());
        assert_eq!(gateway.identity().as_str(), "replacement");

        let result = gateway.transcribe_window(make_window(), None).await;
        assert_eq!(result.text, "fresh");
    }

    #[tokio::test]
    async fn success_resets_error_streak() {
        // err, err, ok, err, err, err → fallback only after the last three
        let primary = Arc::new(MockBackend::script(
            "primary",
            vec![
                err_response(),
                err_response(),
                ok_response("fine"),
                err_response(),
                err_response(),
                err_response(),
            ],
        ));
        let secondary = Arc::new(MockBackend::ok("secondary", "rescued"));
        let mut gateway = BackendGateway::new(
            primary,
            Some(secondary as Arc<dyn SpeechBackend>),
            &config_with_timeout(5),
        );

        for _ in 0..2 {
            assert!(gateway.transcribe_window(make_window(), None).await.is_error());
        }
        assert!(!gateway.transcribe_window(make_window(), None).await.is_error());

        for _ in 0..3 {
            let result = gateway.transcribe_window(make_window(), None).await;
            assert_eq!(result.backend.as_str(), "primary");
            assert!(result.is_error());
        }

        let result = gateway.transcribe_window(make_window(), None).await;
        assert_eq!(result.backend.as_str(), "secondary");
    }
}
