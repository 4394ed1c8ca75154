//! Audio front end — capture → downmix → resampling → windowing.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (mpsc) → stereo_to_mono
//!           → StreamResampler (→ 16 kHz) → Windower → AudioWindow
//! ```
//!
//! The windower is the only policy-bearing piece: it cuts the stream into
//! [`AudioWindow`]s on a fixed schedule or at detected speech boundaries
//! (see [`crate::config::WindowingMode`]).  Everything upstream is plumbing
//! that normalises whatever the capture device produces.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::mpsc;
//! use livesub::audio::{AudioCapture, AudioChunk, Windower};
//! use livesub::config::WindowerConfig;
//!
//! let (tx, rx) = mpsc::channel::<AudioChunk>();
//! let capture = AudioCapture::new(None).unwrap();
//! let _handle = capture.start(tx).unwrap(); // drop handle → stops stream
//!
//! let mut windower = Windower::new(WindowerConfig::default(), 16_000);
//! while let Ok(chunk) = rx.recv() {
//!     // (downmix + resample elided)
//!     for window in windower.push(&chunk.samples) {
//!         println!("window: {} ms @ {} ms", window.duration_ms(), window.start_ms);
//!     }
//! }
//! ```

pub mod buffer;
pub mod capture;
pub mod resample;
pub mod vad;
pub mod window;

pub use buffer::PrerollBuffer;
pub use capture::{AudioCapture, AudioChunk, CaptureError, StreamHandle};
pub use resample::{stereo_to_mono, ResampleError, StreamResampler};
pub use vad::SpeechDetector;
pub use window::{AudioWindow, Windower};
