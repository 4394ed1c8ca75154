//! livesub — real-time speech-to-subtitle streaming pipeline.
//!
//! Ingests a continuous audio stream, asks a pluggable speech-recognition /
//! translation backend to convert successive windows into text, and delivers
//! a clean, de-duplicated, latency-bounded stream of subtitle events to any
//! number of live viewers.
//!
//! # Data flow
//!
//! ```text
//! audio samples → Windower → BackendGateway → HallucinationFilter
//!              → TextStabilizer → EventHub → subscribers
//! ```
//!
//! # Modules
//!
//! * [`audio`] — capture, downmix, resampling, and windowing
//! * [`stt`] — the [`stt::SpeechBackend`] capability trait, local and
//!   remote implementations, and the gateway with its fallback policy
//! * [`filter`] — rejection of known-bad model output
//! * [`stabilizer`] — overlap dedup, duplicate suppression, sentence
//!   buffering, staleness flushing
//! * [`session`] — single-owner session state and the rolling context hint
//! * [`pipeline`] — the coordinating task, control commands, status
//! * [`hub`] — non-blocking fan-out to subscribers
//! * [`config`] — TOML-persisted, hot-reloadable settings

pub mod audio;
pub mod config;
pub mod filter;
pub mod hub;
pub mod pipeline;
pub mod session;
pub mod stabilizer;
pub mod stt;
