//! Speech backend module — the pluggable inference layer.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                 BackendGateway                          │
//! │  single in-flight call · timeout · fallback · swap     │
//! │                      │                                  │
//! │                      ▼                                  │
//! │            SpeechBackend (trait)                        │
//! │        ┌──────────────┴──────────────┐                 │
//! │   LocalBackend                 RemoteBackend            │
//! │   (whisper-rs, in-process)     (reqwest, OpenAI-style)  │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! The pipeline only ever talks to the gateway: it hands in an
//! [`crate::audio::AudioWindow`] and always gets a [`RawResult`] back —
//! backend failures become empty-text results with an error tag, never
//! exceptions travelling up the pipeline.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use livesub::config::BackendConfig;
//! use livesub::stt::{BackendGateway, LocalBackend, SpeechBackend};
//!
//! let config = BackendConfig::default();
//! let backend: Arc<dyn SpeechBackend> =
//!     Arc::new(LocalBackend::load("models/ggml-small.bin").expect("model"));
//! let gateway = BackendGateway::new(backend, None, &config);
//! ```

pub mod backend;
pub mod gateway;
pub mod local;
pub mod remote;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use backend::{BackendError, BackendId, SpeechBackend, TranscribeRequest, Transcription};
pub use gateway::{BackendGateway, RawResult};
pub use local::LocalBackend;
pub use remote::RemoteBackend;

// test-only re-export so other modules' test code can import MockBackend
// without `use livesub::stt::backend::MockBackend`.
#[cfg(test)]
pub use backend::MockBackend;
