//! Pipeline module — the coordinating task, its control surface, and the
//! status it shares with operators.
//!
//! # Architecture
//!
//! ```text
//! audio samples (mpsc) ──▶ PipelineRunner::run()  ← async tokio task
//!                               │
//!                               ├─ Windower          cut stream into windows
//!                               ├─ BackendGateway    one in-flight call, fallback
//!                               ├─ HallucinationFilter
//!                               ├─ TextStabilizer    merge, dedup, buffer, flush
//!                               └─ EventHub          fan out to subscribers
//!
//! ControlCommand (mpsc) ──▶ mode / backend / config changes at runtime
//! SharedStatus           ◀── counters + degraded signal for the operator
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use livesub::config::AppConfig;
//! use livesub::hub::EventHub;
//! use livesub::pipeline::{new_shared_status, ControlCommand, PipelineRunner};
//! use livesub::stt::{BackendGateway, LocalBackend};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let backend = Arc::new(LocalBackend::load("models/ggml-small.bin").unwrap());
//!     let gateway = BackendGateway::new(backend, None, &config.backend);
//!
//!     let hub = EventHub::new(&config.hub);
//!     let status = new_shared_status(config.windower.mode, gateway.identity().to_string());
//!     let runner = PipelineRunner::new(&config, gateway, hub.clone(), status);
//!
//!     let (_audio_tx, audio_rx) = mpsc::channel(32);
//!     let (_control_tx, control_rx) = mpsc::channel::<ControlCommand>(8);
//!     tokio::spawn(runner.run(audio_rx, control_rx));
//! }
//! ```

pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use runner::{ControlCommand, PipelineRunner};
pub use state::{new_shared_status, PipelineHealth, PipelineStatus, SharedStatus};
