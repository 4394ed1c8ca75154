//! In-process Whisper backend via `whisper-rs`.
//!
//! [`LocalBackend`] wraps a `whisper_rs::WhisperContext`.  A new
//! `WhisperState` is created for every call so the backend can be shared
//! across threads without locking.  Inference runs under
//! [`tokio::task::block_in_place`] so the pipeline task's worker is released
//! while the model grinds — the gateway's single-in-flight policy means
//! there is never more than one inference running anyway.

use std::path::Path;

use async_trait::async_trait;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::config::TranscribeTask;
use crate::stt::backend::{
    BackendError, BackendId, SpeechBackend, TranscribeRequest, Transcription,
};

// ---------------------------------------------------------------------------
// Audio length guards (16 kHz mono f32)
// ---------------------------------------------------------------------------

/// Whisper misbehaves below ~0.5 s of audio; shorter windows produce nothing.
const MIN_AUDIO_SAMPLES: usize = 8_000;
/// Upper guard: 60 s × 16 000 Hz.
const MAX_AUDIO_SAMPLES: usize = 960_000;

// ---------------------------------------------------------------------------
// LocalBackend
// ---------------------------------------------------------------------------

/// Production in-process backend wrapping a GGML Whisper model.
pub struct LocalBackend {
    ctx: WhisperContext,
    model_name: String,
    n_threads: i32,
}

impl std::fmt::Debug for LocalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBackend")
            .field("model_name", &self.model_name)
            .field("n_threads", &self.n_threads)
            .finish_non_exhaustive()
    }
}

// `WhisperContext` holds a raw pointer internally but declares
// `unsafe impl Send` and `unsafe impl Sync` in whisper-rs — the model
// weights are read-only after loading.
// SAFETY: WhisperContext is Send+Sync as declared by whisper-rs.
unsafe impl Send for LocalBackend {}
unsafe impl Sync for LocalBackend {}

impl LocalBackend {
    /// Load a GGML model from `model_path`.
    ///
    /// # Errors
    ///
    /// - [`BackendError::ModelNotFound`] — `model_path` does not exist.
    /// - [`BackendError::Init`] — whisper-rs failed to load the file.
    pub fn load(model_path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let path = model_path.as_ref();

        if !path.exists() {
            return Err(BackendError::ModelNotFound(path.display().to_string()));
        }

        let path_str = path.to_str().ok_or_else(|| {
            BackendError::ModelNotFound(format!(
                "model path contains non-UTF-8 characters: {}",
                path.display()
            ))
        })?;

        let model_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        let ctx_params = WhisperContextParameters::default();
        let ctx = WhisperContext::new_with_params(path_str, ctx_params)
            .map_err(|e| BackendError::Init(e.to_string()))?;

        Ok(Self {
            ctx,
            model_name,
            n_threads: optimal_threads(),
        })
    }

    /// One synchronous inference pass; called under `block_in_place`.
    fn run_inference(&self, req: &TranscribeRequest<'_>) -> Result<Transcription, BackendError> {
        let mut fp = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

        // set_language takes an Option<&str> whose lifetime is tied to fp;
        // the borrow of req.language outlives state.full below.
        let lang: Option<&str> = if req.language == "auto" {
            None
        } else {
            Some(req.language)
        };
        fp.set_language(lang);
        fp.set_translate(req.task == TranscribeTask::Translate);
        fp.set_n_threads(self.n_threads);
        fp.set_print_progress(false);
        fp.set_print_realtime(false);

        if let Some(hint) = req.context_hint {
            fp.set_initial_prompt(hint);
        }

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| BackendError::Init(e.to_string()))?;

        state
            .full(fp, req.samples)
            .map_err(|e| BackendError::Inference(e.to_string()))?;

        let n_segments = state
            .full_n_segments()
            .map_err(|e| BackendError::Inference(e.to_string()))?;

        let mut text = String::new();
        for i in 0..n_segments {
            let seg_text = state
                .full_get_segment_text(i)
                .map_err(|e| BackendError::Inference(format!("segment {i}: {e}")))?;
            text.push_str(&seg_text);
        }

        Ok(Transcription {
            text: text.trim().to_string(),
            source_text: None,
            no_speech_prob: None,
        })
    }
}

#[async_trait]
impl SpeechBackend for LocalBackend {
    async fn transcribe(
        &self,
        req: TranscribeRequest<'_>,
    ) -> Result<Transcription, BackendError> {
        if req.samples.len() < MIN_AUDIO_SAMPLES {
            // Too short to transcribe; treat as silence rather than an error.
            return Ok(Transcription::default());
        }
        if req.samples.len() > MAX_AUDIO_SAMPLES {
            return Err(BackendError::Inference(format!(
                "window too long: {} samples (max {MAX_AUDIO_SAMPLES})",
                req.samples.len()
            )));
        }

        tokio::task::block_in_place(|| self.run_inference(&req))
    }

    fn supports_translation(&self) -> bool {
        true
    }

    fn identity(&self) -> BackendId {
        BackendId::new(format!("local:{}", self.model_name))
    }
}

/// Number of CPU threads handed to Whisper, capped at 8 to avoid
/// diminishing returns.
fn optimal_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8) as i32)
        .unwrap_or(4)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
